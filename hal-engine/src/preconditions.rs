//! Conditional request evaluation (`If-Match`, `If-None-Match`).

use http::{HeaderMap, Method};

use crate::error::PreconditionError;
use crate::etag::{ETag, ETagMatch};

const IF_MATCH: &str = "if-match";
const IF_NONE_MATCH: &str = "if-none-match";

fn is_safe(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}

/// Checks the conditional request headers in `headers` against `etag`.
///
/// `require_if_match` / `require_if_none_match` turn an absent header into a
/// `428 Precondition Required`.
pub fn assert_preconditions(
    method: &Method,
    headers: &HeaderMap,
    etag: &ETag,
    require_if_match: bool,
    require_if_none_match: bool,
) -> Result<(), PreconditionError> {
    let if_match = ETagMatch::from_headers(headers, IF_MATCH)?;
    let if_none_match = ETagMatch::from_headers(headers, IF_NONE_MATCH)?;
    assert_if_match(if_match.as_ref(), etag, require_if_match)?;
    assert_if_none_match(method, if_none_match.as_ref(), etag, require_if_none_match)
}

fn assert_if_match(
    condition: Option<&ETagMatch>,
    etag: &ETag,
    require: bool,
) -> Result<(), PreconditionError> {
    let Some(condition) = condition else {
        if require {
            return Err(PreconditionError::Required("If-Match"));
        }
        return Ok(());
    };
    let tags = match condition {
        ETagMatch::Any => {
            return match etag {
                ETag::NotFound | ETag::Unknown => Err(PreconditionError::Failed(None)),
                ETag::Unsupported | ETag::Tag(_) => Ok(()),
            };
        }
        ETagMatch::Tags(tags) => tags,
    };
    match etag {
        ETag::Unsupported | ETag::NotFound => Err(PreconditionError::Failed(Some(
            "Resource doesn't support If-Match header.",
        ))),
        ETag::Unknown => Err(PreconditionError::NotFound),
        ETag::Tag(tag) if tags.contains(tag) => Ok(()),
        ETag::Tag(_) => Err(PreconditionError::Failed(None)),
    }
}

fn assert_if_none_match(
    method: &Method,
    condition: Option<&ETagMatch>,
    etag: &ETag,
    require: bool,
) -> Result<(), PreconditionError> {
    let Some(condition) = condition else {
        if require {
            return Err(PreconditionError::Required("If-None-Match"));
        }
        return Ok(());
    };
    let tags = match (etag, condition) {
        // Nothing that could conflict.
        (ETag::NotFound | ETag::Unknown, _) => return Ok(()),
        (_, ETagMatch::Any) => return Err(PreconditionError::Failed(None)),
        (_, ETagMatch::Tags(tags)) => tags,
    };
    match etag {
        // The resource exists but can't be compared against the client's
        // tags. Unsafe methods treat that as a match.
        ETag::Unsupported if is_safe(method) => Ok(()),
        ETag::Unsupported => Err(PreconditionError::Failed(Some(
            "Resource doesn't support ETags.",
        ))),
        ETag::Tag(tag) if tags.contains(tag) => {
            if is_safe(method) {
                Err(PreconditionError::NotModified)
            } else {
                Err(PreconditionError::Failed(None))
            }
        }
        _ => Ok(()),
    }
}
