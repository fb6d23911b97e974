use std::collections::BTreeMap;

use serde_json::Value;

use crate::frequency::Frequency;

/// A configured preservation service.
///
/// `kind` names the implementation that performs it; `frequency` of `None`
/// means the service runs once and only resurfaces when flagged `run_needed`.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDefinition {
    pub name: String,
    pub kind: String,
    pub frequency: Option<Frequency>,
    pub properties: BTreeMap<String, Value>,
}

impl ServiceDefinition {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            frequency: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = Some(frequency);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}
