//! The value graph consumed by the streaming encoder.
//!
//! [`Value`] is deliberately richer than `serde_json::Value`: besides plain
//! JSON it can hold lazy single-use streams, resources that are rendered only
//! when the encoder reaches them, and late-bound shared slots (the only way
//! to build a reference cycle, which the encoder detects by identity).

pub mod encoder;

use std::fmt;
use std::sync::{Arc, OnceLock};

use futures::stream::{self, BoxStream, Stream, StreamExt};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;

use crate::resource::{Link, Resource};

pub use encoder::{DEFAULT_CHUNK_SIZE, EncoderOptions, encode};

#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Array(Arc<[Value]>),
    /// String-keyed entries, encoded in order.
    Object(Arc<[(String, Value)]>),
    Stream(ValueStream),
    Resource(Arc<dyn Resource>),
    Shared(SharedValue),
    /// A value of unknown shape; encoded as its `Display` form.
    Opaque(Arc<dyn fmt::Display + Send + Sync>),
    /// Marks a stream as a sequence of `[key, value]` pairs when it is the
    /// first item of that stream.
    ObjectMarker,
}

impl Value {
    pub fn array<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Self::Array(items.into_iter().collect())
    }

    pub fn object<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn opaque<T>(value: T) -> Self
    where
        T: fmt::Display + Send + Sync + 'static,
    {
        Self::Opaque(Arc::new(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Looks up `key` in an `Object`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Object(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Int(i) => write!(f, "Int({i})"),
            Self::UInt(u) => write!(f, "UInt({u})"),
            Self::Float(x) => write!(f, "Float({x})"),
            Self::String(s) => write!(f, "String({s:?})"),
            Self::Array(items) => f.debug_list().entries(items.iter()).finish(),
            Self::Object(entries) => f
                .debug_map()
                .entries(entries.iter().map(|(k, v)| (k, v)))
                .finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
            Self::Resource(r) => write!(f, "Resource({})", r.view().canonical_url()),
            Self::Shared(s) => write!(f, "Shared({:#x})", s.id()),
            Self::Opaque(o) => write!(f, "Opaque({o})"),
            Self::ObjectMarker => f.write_str("ObjectMarker"),
        }
    }
}

impl From<JsonValue> for Value {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Self::UInt(u)
                } else {
                    Self::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            JsonValue::String(s) => Self::String(s),
            JsonValue::Array(items) => Self::array(items.into_iter().map(Value::from)),
            JsonValue::Object(map) => Self::object(map.into_iter().map(|(k, v)| (k, v.into()))),
        }
    }
}

impl From<Link> for Value {
    fn from(link: Link) -> Self {
        let mut entries = vec![("href".to_string(), Value::String(link.href))];
        if let Some(name) = link.name {
            entries.push(("name".to_string(), Value::String(name)));
        }
        if let Some(title) = link.title {
            entries.push(("title".to_string(), Value::String(title)));
        }
        Self::Object(entries.into())
    }
}

impl From<Arc<dyn Resource>> for Value {
    fn from(resource: Arc<dyn Resource>) -> Self {
        Self::Resource(resource)
    }
}

impl From<ValueStream> for Value {
    fn from(stream: ValueStream) -> Self {
        Self::Stream(stream)
    }
}

impl From<SharedValue> for Value {
    fn from(shared: SharedValue) -> Self {
        Self::Shared(shared)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(items.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i.into())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        Self::UInt(u)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// A lazy sequence that can be consumed exactly once.
///
/// Clones share the underlying stream: whichever clone is encoded first
/// consumes it, every later one finds it empty.
#[derive(Clone)]
pub struct ValueStream(Arc<Mutex<Option<BoxStream<'static, Value>>>>);

impl ValueStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Value> + Send + 'static,
    {
        Self(Arc::new(Mutex::new(Some(stream.boxed()))))
    }

    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: Send + 'static,
    {
        Self::new(stream::iter(values))
    }

    /// A stream that encodes as a JSON object.
    pub fn object<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
        I::IntoIter: Send + 'static,
    {
        let pairs = stream::iter(entries)
            .map(|(key, value)| Value::array([Value::String(key), value]));
        Self::new(stream::once(async { Value::ObjectMarker }).chain(pairs))
    }

    /// Takes the stream out, leaving this (and every clone) consumed.
    pub fn take(&self) -> Option<BoxStream<'static, Value>> {
        self.0.lock().take()
    }

    pub fn is_consumed(&self) -> bool {
        self.0.lock().is_none()
    }
}

/// A slot that is filled after it has been shared.
///
/// Identity is the allocation, not the contents.
#[derive(Clone, Default)]
pub struct SharedValue(Arc<OnceLock<Value>>);

impl SharedValue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fills the slot. Fails, handing the value back, if it was already filled.
    pub fn bind(&self, value: Value) -> Result<(), Value> {
        self.0.set(value)
    }

    pub fn get(&self) -> Option<&Value> {
        self.0.get()
    }

    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}
