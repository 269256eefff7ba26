use heck::{ToLowerCamelCase, ToPascalCase};
use serde_json::{Map, Value};

/// How object keys are rewritten before a batch is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyCase {
    /// Keys are sent exactly as written.
    #[default]
    Preserve,
    /// `request_key` -> `RequestKey`
    Pascal,
    /// `request_key` -> `requestKey`
    LowerCamel,
}

impl KeyCase {
    pub fn apply(self, key: &str) -> String {
        match self {
            KeyCase::Preserve => key.to_owned(),
            KeyCase::Pascal => key.to_pascal_case(),
            KeyCase::LowerCamel => key.to_lower_camel_case(),
        }
    }

    /// Rewrite every object key in `value`, recursing into nested objects
    /// and arrays.
    pub fn rewrite(self, value: Value) -> Value {
        if self == KeyCase::Preserve {
            return value;
        }
        match value {
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (self.apply(&k), self.rewrite(v)))
                    .collect::<Map<String, Value>>(),
            ),
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|v| self.rewrite(v)).collect())
            }
            other => other,
        }
    }
}
