//! Capability Resolver
//!
//! Actions declare the tool groups they need (e.g. `web`). The hosting
//! environment decides which groups are available; the planner drops any
//! action whose requirements are not all met.

use sdk::types::ActionSpec;
use std::collections::{BTreeMap, HashMap};

/// Web search and fetch tools
pub const WEB: &str = "web";

/// Headless browser automation tools
pub const BROWSER_AUTOMATION: &str = "browser_automation";

/// Decides whether a capability can be used by actions
pub trait CapabilityResolver: Send + Sync {
    fn is_available(&self, capability: &str) -> bool;

    /// Required capabilities of `spec` that are not available, sorted
    fn missing(&self, spec: &ActionSpec) -> Vec<String> {
        spec.required_capabilities
            .iter()
            .filter(|capability| !self.is_available(capability))
            .cloned()
            .collect()
    }

    fn allows(&self, spec: &ActionSpec) -> bool {
        spec.required_capabilities
            .iter()
            .all(|capability| self.is_available(capability))
    }
}

/// Fixed availability table, usually built from configuration
///
/// Capabilities not present in the table are unavailable.
#[derive(Debug, Clone, Default)]
pub struct StaticCapabilities {
    available: HashMap<String, bool>,
}

impl StaticCapabilities {
    /// Table with nothing available
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with(mut self, capability: impl Into<String>, available: bool) -> Self {
        self.available.insert(capability.into(), available);
        self
    }

    pub fn enable(self, capability: impl Into<String>) -> Self {
        self.with(capability, true)
    }

    /// Build from the `[capabilities]` config table
    pub fn from_table(table: &BTreeMap<String, bool>) -> Self {
        Self {
            available: table.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        }
    }
}

impl CapabilityResolver for StaticCapabilities {
    fn is_available(&self, capability: &str) -> bool {
        self.available.get(capability).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_capability_unavailable() {
        let caps = StaticCapabilities::none().enable(WEB);
        assert!(caps.is_available(WEB));
        assert!(!caps.is_available(BROWSER_AUTOMATION));
    }

    #[test]
    fn test_explicitly_disabled() {
        let caps = StaticCapabilities::none().with(WEB, false);
        assert!(!caps.is_available(WEB));
    }

    #[test]
    fn test_missing_lists_sorted_unavailable() {
        let caps = StaticCapabilities::none().enable(WEB);
        let spec = ActionSpec::new("find", "News")
            .with_capability(WEB)
            .with_capability(BROWSER_AUTOMATION)
            .with_capability("arxiv");

        assert_eq!(caps.missing(&spec), vec!["arxiv", BROWSER_AUTOMATION]);
        assert!(!caps.allows(&spec));
        assert!(caps.allows(&ActionSpec::new("plain", "X")));
    }

    #[test]
    fn test_from_table() {
        let mut table = BTreeMap::new();
        table.insert(WEB.to_string(), true);
        table.insert(BROWSER_AUTOMATION.to_string(), false);

        let caps = StaticCapabilities::from_table(&table);
        assert!(caps.is_available(WEB));
        assert!(!caps.is_available(BROWSER_AUTOMATION));
    }
}
