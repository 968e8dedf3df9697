//! ParameterSet - named parameters mapped to ordered value lists
//!
//! The same shape describes a whole sweep (every candidate value) and a
//! single experiment (exactly one value per parameter). Descriptors are
//! persisted as pretty-printed JSON objects.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ScanError, ScanResult};

/// Mapping from parameter name to its ordered values.
///
/// Equality ignores key order but not the order inside each value list.
/// Numbers compare by value, so `1` and `1.0` are the same setting.
/// Insertion order is kept so that sweep enumeration is reproducible.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet(IndexMap<String, Vec<Value>>);

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a parameter, keeping its original position on replace
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<Value>) {
        self.0.insert(name.into(), values);
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with(mut self, name: impl Into<String>, values: Vec<Value>) -> Self {
        self.insert(name, values);
        self
    }

    pub fn get(&self, name: &str) -> Option<&[Value]> {
        self.0.get(name).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parameter names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// True when every parameter holds exactly one value
    pub fn is_single(&self) -> bool {
        self.0.values().all(|values| values.len() == 1)
    }

    /// Number of configurations the cross-product will produce
    pub fn combination_count(&self) -> usize {
        self.0.values().map(Vec::len).product()
    }

    /// Expand into every single-value configuration.
    ///
    /// The first parameter varies slowest, the last fastest. Each scalar is
    /// wrapped in a one-element list so the result has descriptor shape.
    pub fn cross_product(&self) -> Vec<ParameterSet> {
        let mut combos: Vec<IndexMap<String, Vec<Value>>> = vec![IndexMap::new()];

        for (name, values) in &self.0 {
            let mut next = Vec::with_capacity(combos.len() * values.len());
            for combo in &combos {
                for value in values {
                    let mut expanded = combo.clone();
                    expanded.insert(name.clone(), vec![value.clone()]);
                    next.push(expanded);
                }
            }
            combos = next;
        }

        combos.into_iter().map(ParameterSet).collect()
    }

    /// Short stable identifier: Blake3 of the key-sorted canonical JSON,
    /// first 8 bytes. Equal sets have equal fingerprints.
    pub fn fingerprint(&self) -> String {
        let sorted: BTreeMap<&String, &Vec<Value>> = self.0.iter().collect();
        let canonical: serde_json::Map<String, Value> = sorted
            .into_iter()
            .map(|(name, values)| {
                let values = values.iter().map(canonical_value).collect();
                (name.clone(), Value::Array(values))
            })
            .collect();
        let text = Value::Object(canonical).to_string();
        hex::encode(&blake3::hash(text.as_bytes()).as_bytes()[..8])
    }

    /// Parse a descriptor from JSON text
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Read a descriptor file
    pub fn read(path: &Path) -> ScanResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ScanError::io(path, e))?;
        Self::from_json_str(&content).map_err(|e| ScanError::format(path, e.to_string()))
    }

    /// Write a descriptor file.
    ///
    /// The content goes to a sibling temp file first and is renamed into
    /// place, so readers never observe a partial descriptor.
    pub fn write(&self, path: &Path) -> ScanResult<()> {
        let content = serde_json::to_string_pretty(self)?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| ScanError::format(path, "descriptor path has no file name"))?;
        let tmp = path.with_file_name(format!(".{file_name}.tmp"));

        fs::write(&tmp, content).map_err(|e| ScanError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| ScanError::io(path, e))?;

        Ok(())
    }
}

/// `value` with integral floats rewritten as integers and object keys
/// sorted, recursively
fn canonical_value(value: &Value) -> Value {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Value::from(f as i64)
            }
            _ => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(canonical_value).collect()),
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            Value::Object(
                sorted
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonical_value(v)))
                    .collect(),
            )
        }
        _ => value.clone(),
    }
}

fn same_values(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(x, y)| x == y || canonical_value(x) == canonical_value(y))
}

impl PartialEq for ParameterSet {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self.0.iter().all(|(name, values)| {
                other
                    .0
                    .get(name)
                    .is_some_and(|theirs| same_values(values, theirs))
            })
    }
}

impl Eq for ParameterSet {}

impl FromIterator<(String, Vec<Value>)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (String, Vec<Value>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, (name, values)) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}=")?;
            if let [single] = values.as_slice() {
                write!(f, "{single}")?;
            } else {
                write!(f, "{}", Value::Array(values.clone()))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn ranges() -> ParameterSet {
        ParameterSet::new()
            .with("a", vec![json!(1), json!(2)])
            .with("b", vec![json!(10)])
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("params.json");

        let params = ranges();
        params.write(&path).unwrap();

        let loaded = ParameterSet::read(&path).unwrap();
        assert_eq!(loaded, params);
        assert_eq!(loaded.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(!dir.path().join(".params.json.tmp").exists());
    }

    #[test]
    fn test_equality_ignores_key_order() {
        let forward = ParameterSet::new()
            .with("a", vec![json!(1)])
            .with("b", vec![json!(10)]);
        let backward = ParameterSet::new()
            .with("b", vec![json!(10)])
            .with("a", vec![json!(1)]);

        assert_eq!(forward, backward);
        assert_eq!(forward.fingerprint(), backward.fingerprint());
    }

    #[test]
    fn test_equality_respects_value_order() {
        let one = ParameterSet::new().with("a", vec![json!(1), json!(2)]);
        let other = ParameterSet::new().with("a", vec![json!(2), json!(1)]);

        assert_ne!(one, other);
        assert_ne!(one.fingerprint(), other.fingerprint());
    }

    #[test]
    fn test_numbers_compare_by_value() {
        let int = ParameterSet::new().with("a", vec![json!(1), json!([2, {"w": 3}])]);
        let float = ParameterSet::new().with("a", vec![json!(1.0), json!([2.0, {"w": 3.0}])]);

        assert_eq!(int, float);
        assert_eq!(int.fingerprint(), float.fingerprint());

        let half = ParameterSet::new().with("a", vec![json!(1.5), json!([2, {"w": 3}])]);
        assert_ne!(int, half);
        assert_ne!(int.fingerprint(), half.fingerprint());

        let text = ParameterSet::new().with("a", vec![json!("1"), json!([2, {"w": 3}])]);
        assert_ne!(int, text);
    }

    #[test]
    fn test_cross_product_order() {
        let params = ParameterSet::new()
            .with("a", vec![json!(1), json!(2)])
            .with("b", vec![json!("x"), json!("y")]);

        let combos = params.cross_product();
        let rendered: Vec<String> = combos.iter().map(|c| c.to_string()).collect();

        assert_eq!(
            rendered,
            vec![
                r#"a=1, b="x""#,
                r#"a=1, b="y""#,
                r#"a=2, b="x""#,
                r#"a=2, b="y""#,
            ]
        );
        assert!(combos.iter().all(ParameterSet::is_single));
        assert_eq!(params.combination_count(), 4);
    }

    #[test]
    fn test_cross_product_scenario() {
        let combos = ranges().cross_product();

        assert_eq!(combos.len(), 2);
        assert_eq!(
            combos[0],
            ParameterSet::new()
                .with("a", vec![json!(1)])
                .with("b", vec![json!(10)])
        );
        assert_eq!(
            combos[1],
            ParameterSet::new()
                .with("a", vec![json!(2)])
                .with("b", vec![json!(10)])
        );
    }

    #[test]
    fn test_cross_product_empty_values() {
        let params = ParameterSet::new()
            .with("a", vec![json!(1)])
            .with("b", Vec::new());

        assert!(params.cross_product().is_empty());
        assert_eq!(params.combination_count(), 0);
    }

    #[test]
    fn test_read_truncated_is_format_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("params.json");
        std::fs::write(&path, r#"{"a": [1"#).unwrap();

        let err = ParameterSet::read(&path).unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn test_read_rejects_scalar_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("params.json");
        std::fs::write(&path, r#"{"a": 1}"#).unwrap();

        assert!(ParameterSet::read(&path).unwrap_err().is_format());
    }

    #[test]
    fn test_read_missing_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = ParameterSet::read(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ScanError::Io { .. }));
    }
}
