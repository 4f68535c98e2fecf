use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use indexmap::IndexMap;

use crate::foundation::core::Position;
use crate::frame::frame::Frame;
use crate::service::service::{Service, WeakService};

/// One attribute value.
#[derive(Clone)]
pub enum Value {
    Int(i64),
    Double(f64),
    Str(String),
    Frame(Frame),
    /// Owning reference; keeps the service alive.
    Service(Service),
    /// Back reference; reads as absent once the service is gone.
    WeakService(WeakService),
    Data(Arc<dyn Any + Send + Sync>),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "Int({v})"),
            Self::Double(v) => write!(f, "Double({v})"),
            Self::Str(v) => write!(f, "Str({v:?})"),
            Self::Frame(_) => f.write_str("Frame(..)"),
            Self::Service(s) => write!(f, "Service({})", s.id()),
            Self::WeakService(_) => f.write_str("WeakService(..)"),
            Self::Data(_) => f.write_str("Data(..)"),
        }
    }
}

impl Value {
    pub fn as_int(&self) -> i64 {
        match self {
            Self::Int(v) => *v,
            Self::Double(v) => *v as i64,
            Self::Str(s) => parse_int(s),
            _ => 0,
        }
    }

    pub fn as_double(&self) -> f64 {
        match self {
            Self::Int(v) => *v as f64,
            Self::Double(v) => *v,
            Self::Str(s) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// String form of scalar values.
    pub fn as_string(&self) -> Option<String> {
        match self {
            Self::Int(v) => Some(v.to_string()),
            Self::Double(v) => Some(v.to_string()),
            Self::Str(s) => Some(s.clone()),
            _ => None,
        }
    }
}

// Leading integer prefix, the way attribute strings are read everywhere else.
fn parse_int(s: &str) -> i64 {
    let t = s.trim();
    if let Ok(v) = t.parse::<i64>() {
        return v;
    }
    if let Ok(v) = t.parse::<f64>() {
        return v as i64;
    }
    let end = t
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map_or(t.len(), |(i, _)| i);
    t[..end].parse().unwrap_or(0)
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Frame> for Value {
    fn from(v: Frame) -> Self {
        Self::Frame(v)
    }
}

impl From<Service> for Value {
    fn from(v: Service) -> Self {
        Self::Service(v)
    }
}

impl From<WeakService> for Value {
    fn from(v: WeakService) -> Self {
        Self::WeakService(v)
    }
}

/// Ordered, thread-safe attribute bag.
#[derive(Default)]
pub struct Properties {
    map: Mutex<IndexMap<String, Value>>,
}

impl fmt::Debug for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries()).finish()
    }
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, IndexMap<String, Value>> {
        self.map.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        // The replaced value is dropped after the guard so its teardown cannot re-enter.
        let previous = self.map().insert(key.to_string(), value);
        drop(previous);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.map().shift_remove(key)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.map().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }

    pub fn get_int(&self, key: &str) -> i64 {
        self.get(key).map_or(0, |v| v.as_int())
    }

    pub fn get_position(&self, key: &str) -> Position {
        self.get_int(key)
    }

    pub fn get_double(&self, key: &str) -> f64 {
        self.get(key).map_or(0.0, |v| v.as_double())
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.as_string())
    }

    /// Service stored under `key`, upgrading weak references.
    pub fn get_service(&self, key: &str) -> Option<Service> {
        match self.get(key)? {
            Value::Service(s) => Some(s),
            Value::WeakService(w) => w.upgrade(),
            _ => None,
        }
    }

    pub fn get_frame(&self, key: &str) -> Option<Frame> {
        match self.get(key)? {
            Value::Frame(f) => Some(f),
            _ => None,
        }
    }

    pub fn get_data<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        match self.get(key)? {
            Value::Data(d) => d.downcast::<T>().ok(),
            _ => None,
        }
    }

    /// Truthy integer read; absent keys are false.
    pub fn flag(&self, key: &str) -> bool {
        self.get_int(key) != 0
    }

    pub fn names(&self) -> Vec<String> {
        self.map().keys().cloned().collect()
    }

    /// Ordered snapshot of every entry.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.map()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn with_prefix(&self, prefix: &str) -> Vec<(String, Value)> {
        self.map()
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Copy the comma-separated `list` of keys present in `source`.
    pub fn pass_list(&self, source: &Properties, list: &str) {
        for key in list.split(',').map(str::trim).filter(|k| !k.is_empty()) {
            if let Some(v) = source.get(key) {
                self.set(key, v);
            }
        }
    }

    /// Copy every entry of `source` whose key starts with `prefix`, stripping the prefix.
    pub fn pass_prefixed(&self, source: &Properties, prefix: &str) {
        for (k, v) in source.with_prefix(prefix) {
            self.set(&k[prefix.len()..], v);
        }
    }

    pub(crate) fn clear(&self) -> Vec<(String, Value)> {
        self.map().drain(..).collect()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/properties/bag.rs"]
mod tests;
