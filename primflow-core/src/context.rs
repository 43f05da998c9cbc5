//! Per-run execution context.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key/value store shared by every primitive of one workflow run.
///
/// Values are JSON so that any primitive can hand data to any later one.
/// Primitives that expect structured data decode it with [`get_as`], which
/// turns a shape mismatch into an ordinary deserialization error instead of
/// a runtime cast failure deep inside the primitive.
///
/// [`get_as`]: ExecutionContext::get_as
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionContext {
    data: Map<String, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context seeded with the given entries.
    pub fn with_data(data: Map<String, Value>) -> Self {
        Self { data }
    }

    /// Creates a context from a JSON object. Non-object values yield an
    /// empty context; callers taking user input should reject them instead.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(data) => Self { data },
            other => {
                tracing::warn!("Ignoring non-object context value: {}", other);
                Self::default()
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Decodes the entry at `key` into `T`.
    ///
    /// Returns `Ok(None)` when the key is absent.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, serde_json::Error> {
        match self.data.get(key) {
            Some(value) => T::deserialize(value).map(Some),
            None => Ok(None),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Inserts a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.data.insert(key.into(), value.into())
    }

    /// Merges entries into the context. Existing keys are overwritten.
    pub fn merge(&mut self, entries: &Map<String, Value>) {
        for (k, v) in entries {
            self.data.insert(k.clone(), v.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn test_merge_overwrites() {
        let mut ctx = ExecutionContext::new();
        ctx.insert("a", 1);
        ctx.insert("b", "keep");

        let mut entries = Map::new();
        entries.insert("a".to_string(), json!(2));
        entries.insert("c".to_string(), json!(true));
        ctx.merge(&entries);

        assert_eq!(ctx.get("a"), Some(&json!(2)));
        assert_eq!(ctx.get("b"), Some(&json!("keep")));
        assert_eq!(ctx.get("c"), Some(&json!(true)));
        assert_eq!(ctx.len(), 3);
    }

    #[test]
    fn test_get_as_typed() {
        let ctx = ExecutionContext::from_value(json!({"p": {"x": 1, "y": 2}, "bad": "nope"}));

        assert_eq!(ctx.get_as::<Point>("p").unwrap(), Some(Point { x: 1, y: 2 }));
        assert_eq!(ctx.get_as::<Point>("missing").unwrap(), None);
        assert!(ctx.get_as::<Point>("bad").is_err());
    }

    #[test]
    fn test_from_non_object() {
        let ctx = ExecutionContext::from_value(json!([1, 2, 3]));
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let mut ctx = ExecutionContext::new();
        ctx.insert("ok", true);
        assert_eq!(serde_json::to_value(&ctx).unwrap(), json!({"ok": true}));
    }
}
