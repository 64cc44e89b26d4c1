// Job context: the accumulating key/value environment threaded through a job.
// Holds scalar values only and resolves `%{key}` placeholders for actions.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Placeholder grammar: `%%` is a literal percent sign, `%{key}` looks `key` up.
static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%(?:(%)|\{([^{}]*)\})").expect("placeholder regex is valid"));

/// A scalar value stored in the job context.
///
/// Job definitions may only carry strings, integers, floats and booleans in
/// their `environment`, `secrets` and `context` maps. Nested values are
/// rejected when the job is deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl ScalarValue {
    /// Borrow the value as a string slice when it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Bool(b) => write!(f, "{b}"),
            ScalarValue::Integer(i) => write!(f, "{i}"),
            ScalarValue::Float(v) => write!(f, "{v}"),
            ScalarValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::String(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::String(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Integer(value)
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Bool(value)
    }
}

/// A map of scalar values, as found in a job definition.
pub type ScalarMap = HashMap<String, ScalarValue>;

/// Render a scalar map as plain strings (for environment export).
pub fn to_string_map(values: &ScalarMap) -> HashMap<String, String> {
    values
        .iter()
        .map(|(k, v)| (k.clone(), v.to_string()))
        .collect()
}

/// Failure to resolve a `%{key}` template against a [`Context`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InterpolationError {
    #[error("context key '{0}' is not set")]
    MissingKey(String),

    #[error("unterminated placeholder at byte {0}")]
    Unterminated(usize),
}

/// Shared, append-and-override key/value store for a single job.
///
/// Cloning a `Context` yields another handle onto the same store, so actions
/// that receive a clone observe every later merge made by the job runner.
/// Keys are case-sensitive and are never removed.
#[derive(Clone, Default)]
pub struct Context {
    inner: Arc<RwLock<HashMap<String, ScalarValue>>>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("count", &self.inner.read().len())
            .finish()
    }
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a single key, overriding any earlier value.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<ScalarValue>) {
        self.inner.write().insert(key.into(), value.into());
    }

    /// Merge a batch of values. Later merges win on key collision.
    pub fn merge<'a, I>(&self, values: I)
    where
        I: IntoIterator<Item = (&'a String, &'a ScalarValue)>,
    {
        let mut store = self.inner.write();
        for (key, value) in values {
            store.insert(key.clone(), value.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<ScalarValue> {
        self.inner.read().get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Resolve every `%{key}` placeholder in `template`.
    ///
    /// `%%` produces a literal `%`. Any other `%` is copied through as is.
    /// A `%{` without a closing brace is an error rather than literal text.
    pub fn interpolate(&self, template: &str) -> Result<String, InterpolationError> {
        let store = self.inner.read();
        let mut out = String::with_capacity(template.len());
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(template) {
            let Some(whole) = caps.get(0) else { continue };
            check_terminated(&template[last..whole.start()], last)?;
            out.push_str(&template[last..whole.start()]);

            if caps.get(1).is_some() {
                out.push('%');
            } else if let Some(key) = caps.get(2) {
                let key = key.as_str().trim();
                match store.get(key) {
                    Some(value) => out.push_str(&value.to_string()),
                    None => return Err(InterpolationError::MissingKey(key.to_string())),
                }
            }
            last = whole.end();
        }

        check_terminated(&template[last..], last)?;
        out.push_str(&template[last..]);
        Ok(out)
    }
}

fn check_terminated(literal: &str, offset: usize) -> Result<(), InterpolationError> {
    match literal.find("%{") {
        Some(pos) => Err(InterpolationError::Unterminated(offset + pos)),
        None => Ok(()),
    }
}
