//! Chunked, cycle-detecting JSON encoder for [`Value`] graphs.
//!
//! The encoder walks the graph with an explicit stack, so deeply nested
//! documents can't overflow the call stack. Output is produced lazily: the
//! returned stream only makes progress while it is being polled, and the only
//! points where it suspends are upstream streams and embedded resources.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};

use super::Value;
use crate::error::EncodeError;
use crate::resource::Resource;
use crate::resource::document::{error_document, to_document};

/// Default size of the emitted chunks: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderOptions {
    /// Chunks are exactly this long, except for the last one. Clamped to at least 1.
    pub chunk_size: usize,
    /// Emit `NaN`, `Infinity` and `-Infinity` instead of failing on
    /// non-finite floats. The output is not strict JSON then.
    pub allow_nan: bool,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            allow_nan: false,
        }
    }
}

/// Encodes `value` into a stream of byte chunks.
///
/// The stream ends after the first error. It can't be restarted, and any
/// [`ValueStream`](super::ValueStream) inside `value` is consumed by it.
pub fn encode(
    value: Value,
    options: EncoderOptions,
) -> BoxStream<'static, Result<Bytes, EncodeError>> {
    stream::unfold(Some(Encoder::new(value, options)), |state| async move {
        let mut encoder = state?;
        match encoder.next_chunk().await {
            Ok(Some(chunk)) => Some((Ok(chunk), Some(encoder))),
            Ok(None) => None,
            Err(e) => {
                log::error!("JSON encoding aborted: {e}");
                Some((Err(e), None))
            }
        }
    })
    .boxed()
}

/// Encodes `value` completely into one buffer.
pub async fn encode_to_vec(value: Value, allow_nan: bool) -> Result<Vec<u8>, EncodeError> {
    let options = EncoderOptions {
        chunk_size: usize::MAX,
        allow_nan,
    };
    let mut chunks = encode(value, options);
    let mut out = Vec::new();
    while let Some(chunk) = chunks.next().await {
        out.extend_from_slice(&chunk?);
    }
    Ok(out)
}

enum StreamMode {
    /// Nothing read yet; the first item decides between array and object.
    Start,
    Array,
    Object,
}

enum Frame {
    Array {
        items: Arc<[Value]>,
        next: usize,
        id: usize,
    },
    Object {
        entries: Arc<[(String, Value)]>,
        next: usize,
        id: usize,
    },
    Stream {
        stream: BoxStream<'static, Value>,
        mode: StreamMode,
        count: usize,
    },
    /// Releases a shared slot from the active path once its value is done.
    Guard { id: usize },
}

struct Encoder {
    options: EncoderOptions,
    buffer: BytesMut,
    stack: Vec<Frame>,
    /// Identities of the containers on the current descent path.
    path: HashSet<usize>,
    pending: Option<Value>,
    done: bool,
}

impl Encoder {
    fn new(value: Value, options: EncoderOptions) -> Self {
        Self {
            options: EncoderOptions {
                chunk_size: options.chunk_size.max(1),
                ..options
            },
            buffer: BytesMut::new(),
            stack: Vec::new(),
            path: HashSet::new(),
            pending: Some(value),
            done: false,
        }
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>, EncodeError> {
        loop {
            if self.buffer.len() >= self.options.chunk_size {
                return Ok(Some(self.buffer.split_to(self.options.chunk_size).freeze()));
            }
            if self.done {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.buffer.split().freeze()));
            }
            self.step().await?;
        }
    }

    async fn step(&mut self) -> Result<(), EncodeError> {
        if let Some(value) = self.pending.take() {
            return self.write_value(value).await;
        }
        let Some(frame) = self.stack.last_mut() else {
            self.done = true;
            return Ok(());
        };
        match frame {
            Frame::Array { items, next, id } => {
                if let Some(item) = items.get(*next) {
                    if *next > 0 {
                        self.buffer.put_u8(b',');
                    }
                    self.pending = Some(item.clone());
                    *next += 1;
                } else {
                    self.buffer.put_u8(b']');
                    self.path.remove(&*id);
                    self.stack.pop();
                }
            }
            Frame::Object { entries, next, id } => {
                if let Some((key, value)) = entries.get(*next) {
                    if *next > 0 {
                        self.buffer.put_u8(b',');
                    }
                    write_json(&mut self.buffer, key.as_str())?;
                    self.buffer.put_u8(b':');
                    self.pending = Some(value.clone());
                    *next += 1;
                } else {
                    self.buffer.put_u8(b'}');
                    self.path.remove(&*id);
                    self.stack.pop();
                }
            }
            Frame::Guard { id } => {
                self.path.remove(&*id);
                self.stack.pop();
            }
            Frame::Stream {
                stream,
                mode,
                count,
            } => match stream.next().await {
                Some(item) => {
                    match mode {
                        StreamMode::Start => {
                            if matches!(item, Value::ObjectMarker) {
                                self.buffer.put_u8(b'{');
                                *mode = StreamMode::Object;
                                return Ok(());
                            }
                            self.buffer.put_u8(b'[');
                            *mode = StreamMode::Array;
                            self.pending = Some(item);
                        }
                        StreamMode::Array => {
                            self.buffer.put_u8(b',');
                            self.pending = Some(item);
                        }
                        StreamMode::Object => {
                            let (key, value) = into_entry(item)?;
                            if *count > 0 {
                                self.buffer.put_u8(b',');
                            }
                            write_json(&mut self.buffer, key.as_str())?;
                            self.buffer.put_u8(b':');
                            self.pending = Some(value);
                        }
                    }
                    *count += 1;
                }
                None => {
                    match mode {
                        StreamMode::Start => self.buffer.put_slice(b"[]"),
                        StreamMode::Array => self.buffer.put_u8(b']'),
                        StreamMode::Object => self.buffer.put_u8(b'}'),
                    }
                    self.stack.pop();
                }
            },
        }
        Ok(())
    }

    async fn write_value(&mut self, mut value: Value) -> Result<(), EncodeError> {
        loop {
            match value {
                Value::Null => self.buffer.put_slice(b"null"),
                Value::Bool(true) => self.buffer.put_slice(b"true"),
                Value::Bool(false) => self.buffer.put_slice(b"false"),
                Value::Int(i) => write_json(&mut self.buffer, &i)?,
                Value::UInt(u) => write_json(&mut self.buffer, &u)?,
                Value::Float(x) => self.write_float(x)?,
                Value::String(s) => write_json(&mut self.buffer, s.as_str())?,
                Value::Array(items) => {
                    if items.is_empty() {
                        self.buffer.put_slice(b"[]");
                    } else {
                        let id = self.enter(Arc::as_ptr(&items) as *const () as usize)?;
                        self.buffer.put_u8(b'[');
                        self.stack.push(Frame::Array { items, next: 0, id });
                    }
                }
                Value::Object(entries) => {
                    if entries.is_empty() {
                        self.buffer.put_slice(b"{}");
                    } else {
                        let id = self.enter(Arc::as_ptr(&entries) as *const () as usize)?;
                        self.buffer.put_u8(b'{');
                        self.stack.push(Frame::Object {
                            entries,
                            next: 0,
                            id,
                        });
                    }
                }
                Value::Stream(shared) => match shared.take() {
                    Some(stream) => self.stack.push(Frame::Stream {
                        stream,
                        mode: StreamMode::Start,
                        count: 0,
                    }),
                    None => {
                        log::warn!("Stream encountered a second time; encoding it as null");
                        self.buffer.put_slice(b"null");
                    }
                },
                Value::Shared(shared) => match shared.get() {
                    Some(inner) => {
                        let id = self.enter(shared.id())?;
                        self.stack.push(Frame::Guard { id });
                        value = inner.clone();
                        continue;
                    }
                    None => {
                        log::warn!("Unbound shared value; encoding it as null");
                        self.buffer.put_slice(b"null");
                    }
                },
                Value::Resource(resource) => {
                    value = render(resource.as_ref()).await;
                    continue;
                }
                Value::Opaque(opaque) => {
                    let text = opaque.to_string();
                    log::warn!("Don't know how to encode {text:?}; encoding it as a string");
                    write_json(&mut self.buffer, text.as_str())?;
                }
                Value::ObjectMarker => {
                    log::warn!("Object marker outside the head of a stream; encoding it as null");
                    self.buffer.put_slice(b"null");
                }
            }
            return Ok(());
        }
    }

    fn enter(&mut self, id: usize) -> Result<usize, EncodeError> {
        if !self.path.insert(id) {
            return Err(EncodeError::Cyclic);
        }
        Ok(id)
    }

    fn write_float(&mut self, x: f64) -> Result<(), EncodeError> {
        if x.is_finite() {
            return write_json(&mut self.buffer, &x);
        }
        if !self.options.allow_nan {
            return Err(EncodeError::NonFiniteFloat(x));
        }
        let text: &[u8] = if x.is_nan() {
            b"NaN"
        } else if x > 0.0 {
            b"Infinity"
        } else {
            b"-Infinity"
        };
        self.buffer.put_slice(text);
        Ok(())
    }
}

/// Renders an embedded resource.
///
/// Bytes have already been sent at this point, so a failure can't change the
/// response status anymore; it becomes an error object in the document.
async fn render(resource: &dyn Resource) -> Value {
    match to_document(resource).await {
        Ok(document) => document,
        Err(e) => {
            let href = resource.view().canonical_url();
            log::warn!("Embedded resource {href} failed to render: {e}");
            error_document(Some(href), &e)
        }
    }
}

fn into_entry(item: Value) -> Result<(String, Value), EncodeError> {
    if let Value::Array(pair) = &item {
        if let [Value::String(key), value] = &pair[..] {
            return Ok((key.clone(), value.clone()));
        }
    }
    Err(EncodeError::NonStringKey(format!("{item:?}")))
}

fn write_json<T: serde::Serialize + ?Sized>(
    buffer: &mut BytesMut,
    value: &T,
) -> Result<(), EncodeError> {
    serde_json::to_writer(buffer.writer(), value)?;
    Ok(())
}
