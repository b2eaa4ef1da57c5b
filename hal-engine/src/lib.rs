//! # hal-engine
//!
//! A hypermedia resource engine serving HAL+JSON documents over axum.
//!
//! ## Components
//!
//! - **Embed:** parser for the `embed=a(b,c)` query language.
//! - **ETags / preconditions:** the four-state entity tag model and RFC 7232
//!   `If-Match` / `If-None-Match` evaluation.
//! - **Negotiation:** `Accept` header handling.
//! - **JSON:** a streaming, chunked, cycle-detecting encoder.
//! - **Resources:** the [`Resource`] trait, views, the registry and document
//!   assembly, plus a generic GET/HEAD [`resource_handler`].

pub mod embed;
pub mod error;
pub mod etag;
pub mod handler;
pub mod json;
pub mod negotiation;
pub mod preconditions;
pub mod resource;

pub use embed::{DEFAULT_MAX_QUERY_DEPTH, EmbedParser, EmbedSpec, parse_embed};
pub use error::{
    EmbedError, EncodeError, NotAcceptable, PreconditionError, RegistryError, ResourceError,
};
pub use etag::{ETag, ETagGenerator, ETagMatch, etag_from_float, etag_from_int};
pub use handler::{HalState, resource_handler};
pub use json::{EncoderOptions, SharedValue, Value, ValueStream, encode};
pub use negotiation::best_content_type;
pub use preconditions::assert_preconditions;
pub use resource::{
    Link, Registry, RegistryBuilder, Relation, RelationItem, Relations, Resource, View,
    current_etag, to_document,
};
