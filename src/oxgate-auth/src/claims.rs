use std::collections::BTreeMap;

use oxgate_errors::{GatewayError, Result};
use serde::{Deserialize, Serialize};

/// A single claim value. Token claims are dynamic but not untyped: each
/// value is one of a small set of shapes, and accessors fail with a typed
/// error on wrong-shape access instead of panicking or coercing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaimValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<String>),
}

/// The validated claims of a token, registered claims included.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimSet(BTreeMap<String, ClaimValue>);

impl ClaimSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: ClaimValue) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&ClaimValue> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn str(&self, key: &str) -> Result<&str> {
        match self.get(key) {
            Some(ClaimValue::Str(s)) => Ok(s),
            Some(_) => Err(wrong_shape(key, "a string")),
            None => Err(missing(key)),
        }
    }

    pub fn int(&self, key: &str) -> Result<i64> {
        match self.get(key) {
            Some(ClaimValue::Int(n)) => Ok(*n),
            Some(_) => Err(wrong_shape(key, "an integer")),
            None => Err(missing(key)),
        }
    }

    pub fn list(&self, key: &str) -> Result<&[String]> {
        match self.get(key) {
            Some(ClaimValue::List(items)) => Ok(items),
            Some(_) => Err(wrong_shape(key, "a list")),
            None => Err(missing(key)),
        }
    }
}

impl FromIterator<(String, ClaimValue)> for ClaimSet {
    fn from_iter<I: IntoIterator<Item = (String, ClaimValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ClaimSet {
    type Item = (String, ClaimValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, ClaimValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

fn wrong_shape(key: &str, expected: &str) -> GatewayError {
    GatewayError::Unauthorized(format!("claim `{key}` is not {expected}"))
}

fn missing(key: &str) -> GatewayError {
    GatewayError::Unauthorized(format!("claim `{key}` is missing"))
}
