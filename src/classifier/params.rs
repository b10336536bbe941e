//! Flat hyperparameter maps

use crate::error::{Result, TrendlabError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

/// Candidate values per hyperparameter
pub type ParamGrid = BTreeMap<String, Vec<Value>>;

/// Hyperparameter name to JSON value (number, string, bool or list)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object
    pub fn from_json(text: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(text)?)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map.into_iter().collect())),
            Value::Null => Ok(Self::default()),
            other => Err(TrendlabError::ConfigError(format!(
                "params must be a JSON object, got {}",
                other
            ))),
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone().into_iter().collect::<Map<String, Value>>())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy of `self` with every entry of `other` laid on top
    pub fn merged(&self, other: &Params) -> Params {
        let mut out = self.clone();
        for (k, v) in &other.0 {
            out.0.insert(k.clone(), v.clone());
        }
        out
    }

    /// Log every key the family does not recognize
    pub fn warn_unknown(&self, family: &str, known: &[&str]) {
        for key in self.keys().filter(|k| !known.contains(k)) {
            warn!(classifier = family, param = key, "Ignoring unrecognized parameter");
        }
    }

    /// Present and not `null`
    fn value(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    fn invalid(key: &str, value: &Value, expected: &str) -> TrendlabError {
        TrendlabError::invalid_parameter(key, value, format!("expected {}", expected))
    }

    pub fn get_f64(&self, key: &str) -> Result<Option<f64>> {
        self.value(key)
            .map(|v| v.as_f64().ok_or_else(|| Self::invalid(key, v, "a number")))
            .transpose()
    }

    pub fn get_u64(&self, key: &str) -> Result<Option<u64>> {
        self.value(key).map(|v| as_u64(v).ok_or_else(|| Self::invalid(key, v, "a non-negative integer"))).transpose()
    }

    pub fn get_usize(&self, key: &str) -> Result<Option<usize>> {
        Ok(self.get_u64(key)?.map(|v| v as usize))
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        self.value(key)
            .map(|v| v.as_bool().ok_or_else(|| Self::invalid(key, v, "a boolean")))
            .transpose()
    }

    pub fn get_str(&self, key: &str) -> Result<Option<&str>> {
        self.value(key)
            .map(|v| v.as_str().ok_or_else(|| Self::invalid(key, v, "a string")))
            .transpose()
    }

    /// A single integer or a list of integers
    pub fn get_usize_list(&self, key: &str) -> Result<Option<Vec<usize>>> {
        self.list(key, |v| as_u64(v).map(|n| n as usize), "integers")
    }

    /// A single number or a list of numbers
    pub fn get_f64_list(&self, key: &str) -> Result<Option<Vec<f64>>> {
        self.list(key, Value::as_f64, "numbers")
    }

    /// A single string or a list of strings
    pub fn get_str_list(&self, key: &str) -> Result<Option<Vec<String>>> {
        self.list(key, |v| v.as_str().map(str::to_string), "strings")
    }

    fn list<T>(&self, key: &str, item: impl Fn(&Value) -> Option<T>, what: &str) -> Result<Option<Vec<T>>> {
        let Some(value) = self.value(key) else {
            return Ok(None);
        };
        let items = match value {
            Value::Array(items) => items.iter().map(&item).collect::<Option<Vec<T>>>(),
            single => item(single).map(|v| vec![v]),
        };
        items
            .map(Some)
            .ok_or_else(|| Self::invalid(key, value, &format!("one or a list of {}", what)))
    }
}

/// Integers written as `3` or `3.0`
fn as_u64(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| *f >= 0.0 && f.fract() == 0.0)
            .map(|f| f as u64)
    })
}

impl From<BTreeMap<String, Value>> for Params {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Every combination of the grid's candidate values, keys in sorted order
pub fn expand_grid(grid: &ParamGrid) -> Vec<Params> {
    grid.iter().fold(vec![Params::new()], |acc, (key, values)| {
        acc.iter()
            .flat_map(|base| values.iter().map(move |v| base.clone().with(key.clone(), v.clone())))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_typed_getters() {
        let params = Params::from_json(r#"{"epochs": 20, "lr": 0.5, "kernel": "rbf", "sizes": [8, 4], "depth": null}"#)
            .unwrap();
        assert_eq!(params.get_usize("epochs").unwrap(), Some(20));
        assert_eq!(params.get_f64("lr").unwrap(), Some(0.5));
        assert_eq!(params.get_str("kernel").unwrap(), Some("rbf"));
        assert_eq!(params.get_usize_list("sizes").unwrap(), Some(vec![8, 4]));
        assert_eq!(params.get_usize_list("epochs").unwrap(), Some(vec![20]));
        assert_eq!(params.get_usize("depth").unwrap(), None);
        assert_eq!(params.get_usize("missing").unwrap(), None);
        assert!(params.get_usize("kernel").is_err());
        assert!(params.get_f64_list("kernel").is_err());
    }

    #[test]
    fn test_integral_floats_accepted() {
        let params = Params::new().with("n", 3.0);
        assert_eq!(params.get_usize("n").unwrap(), Some(3));
        assert!(Params::new().with("n", 2.5).get_usize("n").is_err());
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(Params::from_json("[1, 2]").is_err());
        assert!(Params::from_json("null").unwrap().is_empty());
    }

    #[test]
    fn test_expand_grid() {
        let mut grid = ParamGrid::new();
        grid.insert("a".to_string(), vec![json!(1), json!(2)]);
        grid.insert("b".to_string(), vec![json!("x"), json!("y"), json!("z")]);
        let combos = expand_grid(&grid);
        assert_eq!(combos.len(), 6);
        assert_eq!(combos[0], Params::new().with("a", 1).with("b", "x"));
        assert_eq!(combos[5], Params::new().with("a", 2).with("b", "z"));
    }

    #[test]
    fn test_merged_overrides() {
        let base = Params::new().with("a", 1).with("b", 2);
        let merged = base.merged(&Params::new().with("b", 3));
        assert_eq!(merged.get_usize("b").unwrap(), Some(3));
        assert_eq!(merged.get_usize("a").unwrap(), Some(1));
    }
}
