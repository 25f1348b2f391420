/// The lexer takes the source input, mapping it into a sequence of tokens.
pub mod lexer;

/// The compiler drives a single pass over the tokens, resolving names and
/// emitting stack-machine code as each construct is recognized.
pub mod compiler;

/// Class-level and subroutine-level name resolution.
pub mod symbol_table;

/// The target instruction set and the emitter that collects it.
pub mod vm;

pub mod token;
pub mod types;
pub mod xml;

pub mod util {
    pub mod intern;
    #[cfg(test)]
    pub(crate) mod test_utils;
}
