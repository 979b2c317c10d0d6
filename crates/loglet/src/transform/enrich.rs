use std::collections::BTreeMap;

use serde_json::Value;

/// Working copy of an entry's fields, mutated by the enrichment stages before encoding.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LogMessage {
    pub fields: BTreeMap<String, Value>,
}

impl LogMessage {
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

/// A single in-place rewrite of a [`LogMessage`].
pub trait FieldStage {
    fn apply(&self, message: &mut LogMessage);
}

/// Adds fields the message does not already carry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DefaultFields {
    pub fields: BTreeMap<String, String>,
}

impl DefaultFields {
    pub fn new(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }
}

impl FieldStage for DefaultFields {
    fn apply(&self, message: &mut LogMessage) {
        for (key, value) in &self.fields {
            message
                .fields
                .entry(key.clone())
                .or_insert_with(|| Value::String(value.clone()));
        }
    }
}

/// Sets fields unconditionally, replacing values already present.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OverrideFields {
    pub fields: BTreeMap<String, String>,
}

impl OverrideFields {
    pub fn new(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }
}

impl FieldStage for OverrideFields {
    fn apply(&self, message: &mut LogMessage) {
        for (key, value) in &self.fields {
            message
                .fields
                .insert(key.clone(), Value::String(value.clone()));
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Enrichment {
    Defaults(DefaultFields),
    Overrides(OverrideFields),
}

impl FieldStage for Enrichment {
    fn apply(&self, message: &mut LogMessage) {
        match self {
            Enrichment::Defaults(stage) => stage.apply(message),
            Enrichment::Overrides(stage) => stage.apply(message),
        }
    }
}
