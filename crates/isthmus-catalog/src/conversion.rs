//! Registry of user-supplied conversion function pairs.

use std::collections::BTreeMap;

use isthmus_core::error::Result;
use isthmus_core::{BridgeError, ConversionPair, ItemId, QualifiedName, Side};

/// Conversion pairs keyed by (A-side type, B-side type).
#[derive(Debug, Clone, Default)]
pub struct ConversionRegistry {
    pairs: BTreeMap<(QualifiedName, QualifiedName), ConversionPair>,
}

impl ConversionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pair. A second registration for the same types fails.
    pub fn register(&mut self, pair: ConversionPair) -> Result<()> {
        let key = (pair.a.clone(), pair.b.clone());
        if self.pairs.contains_key(&key) {
            return Err(BridgeError::duplicate(
                ItemId::ty(Side::A, pair.a.clone()),
                format!("conversion to '{}' already registered", pair.b),
            ));
        }
        if pair.to_b.is_empty() || pair.to_a.is_empty() {
            return Err(BridgeError::incompatible(
                ItemId::ty(Side::A, pair.a.clone()),
                "conversion pair must name both directions",
            ));
        }
        self.pairs.insert(key, pair);
        Ok(())
    }

    pub fn get(&self, a: &QualifiedName, b: &QualifiedName) -> Option<&ConversionPair> {
        self.pairs.get(&(a.clone(), b.clone()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConversionPair> {
        self.pairs.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> ConversionPair {
        ConversionPair {
            a: "String".into(),
            b: "CStr".into(),
            to_b: "string_to_cstr".into(),
            to_a: "cstr_to_string".into(),
        }
    }

    #[test]
    fn register_and_get() {
        let mut reg = ConversionRegistry::new();
        reg.register(pair()).unwrap();
        assert_eq!(reg.len(), 1);
        let found = reg.get(&"String".into(), &"CStr".into()).unwrap();
        assert_eq!(found.to_a, "cstr_to_string");
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut reg = ConversionRegistry::new();
        reg.register(pair()).unwrap();
        let err = reg.register(pair()).unwrap_err();
        assert_eq!(err.code(), "duplicate-type");
    }

    #[test]
    fn incomplete_pair_fails() {
        let mut reg = ConversionRegistry::new();
        let mut p = pair();
        p.to_a.clear();
        assert!(reg.register(p).is_err());
        assert!(reg.is_empty());
    }
}
