//! Strategy Registry - ordered chains keyed by direction and trigger column

use indexmap::IndexMap;
use std::sync::Arc;

use super::{Direction, Strategy};
use crate::config::find_header;

/// A trigger column and the strategies registered under it, in order
pub type Chain = (String, Vec<Arc<dyn Strategy>>);

/// Registry of strategy chains
///
/// `direction -> trigger column -> [strategy, ...]`, both levels keeping
/// registration order.
#[derive(Default, Clone)]
pub struct StrategyRegistry {
    chains: IndexMap<Direction, IndexMap<String, Vec<Arc<dyn Strategy>>>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `strategy` to the chain for (`direction`, `trigger`)
    pub fn register(&mut self, direction: Direction, trigger: impl Into<String>, strategy: Arc<dyn Strategy>) {
        self.chains
            .entry(direction)
            .or_default()
            .entry(trigger.into())
            .or_default()
            .push(strategy);
    }

    /// Chains for `direction` whose trigger column exists in `headers`
    pub fn active_chains(&self, direction: Direction, headers: &[String]) -> Vec<Chain> {
        let Some(by_trigger) = self.chains.get(&direction) else {
            return Vec::new();
        };

        by_trigger
            .iter()
            .filter(|(trigger, chain)| !chain.is_empty() && find_header(headers, trigger).is_some())
            .map(|(trigger, chain)| (trigger.clone(), chain.clone()))
            .collect()
    }

    /// Strategy names registered for (`direction`, `trigger`)
    pub fn names(&self, direction: Direction, trigger: &str) -> Vec<String> {
        self.chains
            .get(&direction)
            .and_then(|by_trigger| by_trigger.get(trigger))
            .map(|chain| chain.iter().map(|s| s.name().to_string()).collect())
            .unwrap_or_default()
    }

    /// Total number of registrations
    pub fn len(&self) -> usize {
        self.chains
            .values()
            .flat_map(|by_trigger| by_trigger.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.chains.clear();
    }
}
