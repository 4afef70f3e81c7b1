use std::collections::BTreeMap;

use crate::math::tensor::Tensor;

/// Snapshot of a model's parameter values, keyed by parameter name.
///
/// A `BTreeMap` keeps iteration (and therefore serialization) order stable,
/// so equal snapshots always serialize to identical bytes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StateDict {
    pub entries: BTreeMap<String, Tensor>,
}

impl StateDict {
    pub fn new() -> StateDict {
        StateDict::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Tensor) {
        self.entries.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
