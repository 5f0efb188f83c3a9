// context.rs - Substitution context: the explicit set of names a template may reference

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// A scalar substituted into a template.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    UInt(u64),
    Bool(bool),
    Text(String),
    Path(PathBuf),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v)  => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            // Geant4 macros expect lowercase booleans.
            Value::Bool(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
            Value::Path(v) => write!(f, "{}", v.display()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self { Value::Int(v) }
}
impl From<u64> for Value {
    fn from(v: u64) -> Self { Value::UInt(v) }
}
impl From<usize> for Value {
    fn from(v: usize) -> Self { Value::UInt(v as u64) }
}
impl From<bool> for Value {
    fn from(v: bool) -> Self { Value::Bool(v) }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self { Value::Text(v.to_owned()) }
}
impl From<String> for Value {
    fn from(v: String) -> Self { Value::Text(v) }
}
impl From<PathBuf> for Value {
    fn from(v: PathBuf) -> Self { Value::Path(v) }
}
impl From<&Path> for Value {
    fn from(v: &Path) -> Self { Value::Path(v.to_path_buf()) }
}

/// Named values available to a rendering pass.
///
/// Ordered so that debug output is stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    values: BTreeMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.values.insert(key.to_owned(), value.into());
        self
    }

    /// Builder form of [`Context::set`].
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Layer `other` on top of `self`; keys in `other` win.
    pub fn merged(&self, other: &Context) -> Context {
        let mut out = self.clone();
        for (k, v) in &other.values {
            out.values.insert(k.clone(), v.clone());
        }
        out
    }
}
