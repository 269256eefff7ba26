use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

mod level;
mod message;

pub use level::{Level, LevelParseError};
pub use message::format_message;

/// A record handed to [`Writer::write`](crate::Writer::write).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogRecord {
    pub level: Level,
    pub message: String,
    /// Property bags merged into the event's `AdditionalData`.
    #[serde(default)]
    pub args: Vec<Value>,
}

/// A JSON object: event payloads, property bags and HEC envelope lines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entry(Map<String, Value>);

impl Entry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Flatten a sequence of loosely-typed values into one object.
    ///
    /// Objects contribute their fields, `null` is skipped, and anything else
    /// is stored under its JSON type name (`string`, `number`, `bool`,
    /// `array`). Colliding keys are disambiguated by [`Entry::merge`].
    pub fn normalize<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        items.into_iter().fold(Entry::new(), |normalized, item| {
            let inner = match item {
                Value::Null => return normalized,
                Value::Object(map) => Entry(map),
                other => {
                    let mut inner = Entry::new();
                    inner.add(type_name(&other), other);
                    inner
                }
            };
            normalized.merge(inner)
        })
    }

    /// Combine two entries. Keys of `other` that already exist are renamed
    /// with the first free suffix (`Name`, `Name1`, `Name2`, ...).
    pub fn merge(self, other: Entry) -> Entry {
        let mut merged = self.0;
        for (key, value) in other.0 {
            let key = if merged.contains_key(&key) {
                (1..)
                    .map(|index| format!("{key}{index}"))
                    .find(|candidate| !merged.contains_key(candidate))
                    .unwrap_or(key)
            } else {
                key
            };
            merged.insert(key, value);
        }
        Entry(merged)
    }
}

impl From<Map<String, Value>> for Entry {
    fn from(map: Map<String, Value>) -> Self {
        Entry(map)
    }
}

impl From<Entry> for Value {
    fn from(entry: Entry) -> Self {
        Value::Object(entry.0)
    }
}

impl FromIterator<(String, Value)> for Entry {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Entry(iter.into_iter().collect())
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
