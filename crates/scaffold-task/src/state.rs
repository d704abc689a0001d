/*
[INPUT]:  Values produced by plan variables and by tasks during a run
[OUTPUT]: Opaque string-keyed state shared by every task of a run
[POS]:    Context layer - mutable state bag lent to each task's run call
[UPDATE]: When changing placeholder syntax or typed accessors
*/

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Shared state handed from task to task during a run.
///
/// The runner owns the bag and lends it mutably to one task at a time. Values
/// are stored as JSON so heterogeneous tasks can exchange data without
/// agreeing on a common Rust type.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StateBag {
    values: Map<String, Value>,
}

impl StateBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Raw JSON value for `key`.
    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Typed read. Returns `None` when the key is missing or has another shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Store a value, returning the previous one if any.
    pub fn insert<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: T,
    ) -> serde_json::Result<Option<Value>> {
        let value = serde_json::to_value(value)?;
        Ok(self.values.insert(key.into(), value))
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Replace `{{key}}` placeholders with the string form of the stored value.
    ///
    /// Unknown keys and unterminated placeholders are left as written.
    pub fn render(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after_open = &rest[start + 2..];
            let Some(end) = after_open.find("}}") else {
                out.push_str(&rest[start..]);
                return out;
            };

            let key = after_open[..end].trim();
            match self.values.get(key) {
                Some(value) => out.push_str(&display_value(value)),
                None => out.push_str(&rest[start..start + 2 + end + 2]),
            }
            rest = &after_open[end + 2..];
        }

        out.push_str(rest);
        out
    }
}

impl FromIterator<(String, Value)> for StateBag {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
