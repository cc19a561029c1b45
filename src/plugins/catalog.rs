//! Strategy catalog for descriptor plugins

use std::collections::BTreeMap;
use std::fmt;

use crate::strategy::StrategyCreator;

/// Named strategy constructors that descriptor plugins can refer to.
///
/// A plugin directory cannot ship code, so its `index.json` names a strategy
/// kind instead, e.g. `"strategy": "text-generation"`.
#[derive(Clone, Default)]
pub struct StrategyCatalog {
    kinds: BTreeMap<String, StrategyCreator>,
}

impl StrategyCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a kind, replacing any previous constructor of the same name.
    pub fn with(mut self, kind: impl Into<String>, creator: StrategyCreator) -> Self {
        self.insert(kind, creator);
        self
    }

    /// Add a kind in place.
    pub fn insert(&mut self, kind: impl Into<String>, creator: StrategyCreator) {
        self.kinds.insert(kind.into(), creator);
    }

    /// Constructor for `kind`.
    pub fn get(&self, kind: &str) -> Option<StrategyCreator> {
        self.kinds.get(kind).cloned()
    }

    /// Known kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        self.kinds.keys().map(String::as_str).collect()
    }

    /// Number of kinds.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

impl fmt::Debug for StrategyCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyCatalog")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::echo::EchoStrategy;
    use crate::strategy::creator;

    #[test]
    fn kinds_are_sorted_and_replaceable() {
        let catalog = StrategyCatalog::new()
            .with("zeta", creator(EchoStrategy::default))
            .with("alpha", creator(EchoStrategy::default))
            .with("zeta", creator(EchoStrategy::default));
        assert_eq!(catalog.kinds(), vec!["alpha", "zeta"]);
        assert!(catalog.get("alpha").is_some());
        assert!(catalog.get("missing").is_none());
        assert_eq!(format!("{catalog:?}"), r#"StrategyCatalog { kinds: ["alpha", "zeta"] }"#);
    }
}
