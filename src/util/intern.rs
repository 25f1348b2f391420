use std::{collections::HashMap, fmt, num::NonZeroU32, rc::Rc};

/// A handle to an interned identifier. To retrieve the `&str`, use
/// [`Interner::get`].
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Symbol(NonZeroU32);

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.0)
    }
}

/// Deduplicates identifier strings so that names can be compared and hashed
/// as integers.
///
/// One interner may be shared by many compilation units, and handles stay
/// valid for as long as it lives.
#[derive(Default)]
pub struct Interner {
    map: HashMap<Rc<str>, Symbol>,
    names: Vec<Rc<str>>,
}

impl fmt::Debug for Interner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (i, name) in self.names.iter().enumerate() {
            map.entry(&(i + 1), name);
        }
        map.finish()
    }
}

impl Interner {
    pub fn with_capacity(capacity: usize) -> Self {
        Interner {
            map: HashMap::with_capacity(capacity),
            names: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn intern(&mut self, name: &str) -> Symbol {
        if let Some(&symbol) = self.map.get(name) {
            return symbol;
        }
        let len = u32::try_from(self.names.len()).expect("interner out of capacity");
        // Handles are one-based so that `Option<Symbol>` stays word-sized.
        let symbol = Symbol(NonZeroU32::MIN.saturating_add(len));
        let key: Rc<str> = Rc::from(name);
        self.names.push(Rc::clone(&key));
        self.map.insert(key, symbol);
        symbol
    }

    /// Looks up an already-interned name without interning it.
    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.map.get(name).copied()
    }

    /// Returns the name behind `symbol`. Panics if the handle comes from
    /// another interner.
    pub fn get(&self, symbol: Symbol) -> &str {
        &self.names[symbol.0.get() as usize - 1]
    }
}
