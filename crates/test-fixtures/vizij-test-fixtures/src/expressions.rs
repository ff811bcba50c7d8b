use std::collections::BTreeMap;

use vizij_avatar_core::ExpressionTarget;

/// Expression sink that records the latest weight per channel.
#[derive(Debug, Default, Clone)]
pub struct MemoryExpressions {
    weights: BTreeMap<String, f32>,
    writes: usize,
}

impl MemoryExpressions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest weight, 0 for channels never written.
    pub fn get(&self, channel: &str) -> f32 {
        self.weights.get(channel).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.weights.contains_key(channel)
    }

    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn channels(&self) -> impl Iterator<Item = (&str, f32)> {
        self.weights.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl ExpressionTarget for MemoryExpressions {
    fn set_expression(&mut self, channel: &str, weight: f32) {
        self.weights.insert(channel.to_string(), weight);
        self.writes += 1;
    }
}
