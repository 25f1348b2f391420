use crate::util::intern::{Interner, Symbol};

/// The declared type of a variable.
///
/// Types are only used to name the class of a method-call receiver, so no
/// checking happens on them.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Type {
    Int,
    Char,
    Boolean,
    Class(Symbol),
}

impl Type {
    pub fn name<'i>(&self, interner: &'i Interner) -> &'i str {
        match self {
            Type::Int => "int",
            Type::Char => "char",
            Type::Boolean => "boolean",
            Type::Class(name) => interner.get(*name),
        }
    }
}

/// Classes and subroutines of the runtime library which compiled code calls
/// into.
pub mod runtime {
    pub const MEMORY_ALLOC: &str = "Memory.alloc";
    pub const MATH_MULTIPLY: &str = "Math.multiply";
    pub const MATH_DIVIDE: &str = "Math.divide";
    pub const STRING_NEW: &str = "String.new";
    pub const STRING_APPEND_CHAR: &str = "String.appendChar";
}
