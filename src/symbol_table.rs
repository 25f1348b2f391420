use std::collections::HashMap;

use crate::{types::Type, util::intern::Symbol, vm::Segment};

/// The storage class of a declared name.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Static,
    Field,
    Arg,
    Var,
}

impl Kind {
    /// The VM segment variables of this kind live in.
    pub fn segment(self) -> Segment {
        match self {
            Kind::Static => Segment::Static,
            Kind::Field => Segment::This,
            Kind::Arg => Segment::Argument,
            Kind::Var => Segment::Local,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Kind::Static => "static",
            Kind::Field => "field",
            Kind::Arg => "argument",
            Kind::Var => "local",
        }
    }

    fn is_class_level(self) -> bool {
        matches!(self, Kind::Static | Kind::Field)
    }

    fn slot(self) -> usize {
        match self {
            Kind::Static => 0,
            Kind::Field => 1,
            Kind::Arg => 2,
            Kind::Var => 3,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub ty: Type,
    pub kind: Kind,
    /// Dense per kind, starting at zero.
    pub index: u16,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DefineError {
    /// The name is already defined in the same scope.
    Duplicate(Entry),
    /// Every index of the kind is taken.
    Exhausted,
}

/// Two-level symbol table.
///
/// The class scope holds [`Kind::Static`] and [`Kind::Field`] entries and
/// lives as long as the table. The subroutine scope holds [`Kind::Arg`] and
/// [`Kind::Var`] entries and is emptied by [`SymbolTable::start_subroutine`].
#[derive(Debug, Default)]
pub struct SymbolTable {
    class_scope: HashMap<Symbol, Entry>,
    subroutine_scope: HashMap<Symbol, Entry>,
    counts: [u16; 4],
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable::default()
    }

    /// Discards every argument and local, keeping statics and fields.
    pub fn start_subroutine(&mut self) {
        self.subroutine_scope.clear();
        self.counts[Kind::Arg.slot()] = 0;
        self.counts[Kind::Var.slot()] = 0;
    }

    /// Defines `name` with the next free index of `kind`.
    ///
    /// Fails with the existing entry if the name is already defined in the
    /// same scope. Shadowing a class-level name from a subroutine is allowed.
    pub fn define(&mut self, name: Symbol, ty: Type, kind: Kind) -> Result<Entry, DefineError> {
        let scope = if kind.is_class_level() {
            &self.class_scope
        } else {
            &self.subroutine_scope
        };
        if let Some(existing) = scope.get(&name) {
            return Err(DefineError::Duplicate(*existing));
        }
        let index = self.reserve(kind).ok_or(DefineError::Exhausted)?;
        let entry = Entry { ty, kind, index };
        if kind.is_class_level() {
            self.class_scope.insert(name, entry);
        } else {
            self.subroutine_scope.insert(name, entry);
        }
        Ok(entry)
    }

    /// Allocates the next index of `kind` without binding a name to it.
    ///
    /// Used for a method's implicit receiver, which occupies argument 0 but
    /// cannot be referred to by name. Returns `None` once every `u16` index
    /// of `kind` is taken.
    pub fn reserve(&mut self, kind: Kind) -> Option<u16> {
        let count = &mut self.counts[kind.slot()];
        let index = *count;
        *count = count.checked_add(1)?;
        Some(index)
    }

    /// Resolves `name` in the subroutine scope first, then in the class
    /// scope.
    pub fn resolve(&self, name: Symbol) -> Option<&Entry> {
        self.subroutine_scope
            .get(&name)
            .or_else(|| self.class_scope.get(&name))
    }

    pub fn kind_of(&self, name: Symbol) -> Option<Kind> {
        self.resolve(name).map(|e| e.kind)
    }

    pub fn type_of(&self, name: Symbol) -> Option<Type> {
        self.resolve(name).map(|e| e.ty)
    }

    pub fn index_of(&self, name: Symbol) -> Option<u16> {
        self.resolve(name).map(|e| e.index)
    }

    pub fn var_count(&self, kind: Kind) -> u16 {
        self.counts[kind.slot()]
    }
}
