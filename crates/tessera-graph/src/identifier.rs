//! Query-local variable names.

use std::fmt;

/// A Cypher variable (or parameter name) unique within one accumulator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(String);

impl Identifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Hands out `x0`, `x1`, ... in order.
///
/// Names are deterministic for a given traversal, so identical inputs
/// produce identical statement text.
#[derive(Debug, Default)]
pub struct IdentifierAllocator {
    next: u64,
}

impl IdentifierAllocator {
    pub fn next_identifier(&mut self) -> Identifier {
        let id = Identifier(format!("x{}", self.next));
        self.next += 1;
        id
    }
}
