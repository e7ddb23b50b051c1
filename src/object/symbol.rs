use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// Immutable UTF-8 constant. Interned through [`SymbolTable`], so two
/// symbols with the same text are the same allocation.
pub struct Utf8Const {
    hash: u32,
    text: Box<str>,
}

impl Utf8Const {
    fn new(text: &str) -> Self {
        let bytes = text.as_bytes();
        let hash = (bytes.len() as u32 & 0xffff) | ((crc16(bytes) as u32) << 16);
        Self {
            hash,
            text: text.into(),
        }
    }
}

fn crc16(bytes: &[u8]) -> u16 {
    let mut crc: u16 = 0xffff;
    for &b in bytes {
        crc ^= (b as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

#[derive(Clone)]
pub struct Symbol(Arc<Utf8Const>);

impl Symbol {
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0.text
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.text.as_bytes()
    }

    /// Length in the low half, CRC-16 of the bytes in the high half.
    #[inline]
    pub fn hash_code(&self) -> u32 {
        self.0.hash
    }
}

impl PartialEq for Symbol {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.0.hash);
    }
}

impl Deref for Symbol {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

#[derive(Default)]
pub struct SymbolTable {
    table: HashMap<Box<str>, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_insert(&mut self, content: &str) -> Symbol {
        if let Some(symbol) = self.table.get(content) {
            return symbol.clone();
        }
        let symbol = Symbol(Arc::new(Utf8Const::new(content)));
        self.table.insert(content.into(), symbol.clone());
        symbol
    }

    pub fn get(&self, content: &str) -> Option<Symbol> {
        self.table.get(content).cloned()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }
}
