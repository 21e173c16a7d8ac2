use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const NUMERIC_FEATURES: [&str; 4] = ["age", "bmi", "HbA1c_level", "blood_glucose_level"];
pub const CATEGORICAL_FEATURES: [&str; 2] = ["gender", "smoking_history"];
pub const BINARY_FEATURES: [&str; 2] = ["hypertension", "heart_disease"];
pub const LABEL_KEY: &str = "diabetes";

/// Canonical column order: numeric, categorical, binary.
/// Dataset items and model inputs both follow this order.
pub fn all_features() -> impl Iterator<Item = &'static str> {
    NUMERIC_FEATURES
        .into_iter()
        .chain(CATEGORICAL_FEATURES)
        .chain(BINARY_FEATURES)
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Missing feature '{0}'")]
    MissingFeature(String),
    #[error("Feature '{key}' has the wrong type, expected {expected}")]
    WrongType { key: String, expected: &'static str },
}

/// A raw feature value as found in serialized example records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Float(f32),
    Text(String),
}

/// One raw example: feature name to raw value, including the label.
/// Serializes to a single JSON object, the unit of the example record files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawExample {
    values: BTreeMap<String, RawValue>,
}

impl RawExample {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_float(&mut self, key: &str, value: f32) {
        self.values.insert(key.to_string(), RawValue::Float(value));
    }

    pub fn insert_text(&mut self, key: &str, value: &str) {
        self.values
            .insert(key.to_string(), RawValue::Text(value.to_string()));
    }

    pub fn float(&self, key: &str) -> Result<f32, Error> {
        match self.values.get(key) {
            Some(RawValue::Float(v)) => Ok(*v),
            Some(RawValue::Text(_)) => Err(Error::WrongType {
                key: key.to_string(),
                expected: "float",
            }),
            None => Err(Error::MissingFeature(key.to_string())),
        }
    }

    pub fn text(&self, key: &str) -> Result<&str, Error> {
        match self.values.get(key) {
            Some(RawValue::Text(v)) => Ok(v),
            Some(RawValue::Float(_)) => Err(Error::WrongType {
                key: key.to_string(),
                expected: "text",
            }),
            None => Err(Error::MissingFeature(key.to_string())),
        }
    }
}

/// A transformed feature value: scaled float or vocabulary index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransformedValue {
    Index(i64),
    Float(f32),
}

/// One transformed example, keyed like the raw example it came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransformedExample {
    values: BTreeMap<String, TransformedValue>,
}

impl TransformedExample {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_float(&mut self, key: &str, value: f32) {
        self.values
            .insert(key.to_string(), TransformedValue::Float(value));
    }

    pub fn insert_index(&mut self, key: &str, value: i64) {
        self.values
            .insert(key.to_string(), TransformedValue::Index(value));
    }

    pub fn float(&self, key: &str) -> Result<f32, Error> {
        match self.values.get(key) {
            Some(TransformedValue::Float(v)) => Ok(*v),
            Some(TransformedValue::Index(_)) => Err(Error::WrongType {
                key: key.to_string(),
                expected: "float",
            }),
            None => Err(Error::MissingFeature(key.to_string())),
        }
    }

    pub fn index(&self, key: &str) -> Result<i64, Error> {
        match self.values.get(key) {
            Some(TransformedValue::Index(v)) => Ok(*v),
            Some(TransformedValue::Float(_)) => Err(Error::WrongType {
                key: key.to_string(),
                expected: "index",
            }),
            None => Err(Error::MissingFeature(key.to_string())),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
