//! Entity tags: the four-state [`ETag`] model, conditional header parsing and
//! deterministic tag generation.

use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use http::HeaderMap;
use regex::bytes::Regex;
use serde::Serialize;
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha224};

use crate::error::PreconditionError;

/// The entity-tag state of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ETag {
    /// The resource exists but doesn't support entity tags.
    Unsupported,
    /// The resource doesn't exist.
    NotFound,
    /// The resource supports entity tags, but its existence is undetermined.
    Unknown,
    /// The resource exists; the tag is kept in wire form (`"..."` or `W/"..."`).
    Tag(String),
}

impl ETag {
    /// Wraps an opaque value into a concrete tag.
    ///
    /// Fails if `value` contains a character that isn't allowed inside an
    /// entity tag, such as the double quote.
    pub fn opaque(value: &str, weak: bool) -> Option<Self> {
        if value.is_empty() || !value.bytes().all(is_etagc) {
            return None;
        }
        Some(Self::Tag(etaggify(value, weak)))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Tag(tag) => Some(tag),
            _ => None,
        }
    }

    pub fn is_tag(&self) -> bool {
        matches!(self, Self::Tag(_))
    }
}

impl From<String> for ETag {
    fn from(tag: String) -> Self {
        Self::Tag(tag)
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported => f.write_str("<exists, no etag>"),
            Self::NotFound => f.write_str("<not found>"),
            Self::Unknown => f.write_str("<unknown>"),
            Self::Tag(tag) => f.write_str(tag),
        }
    }
}

// etagc = %x21 / %x23-7E / obs-text
fn is_etagc(b: u8) -> bool {
    b == 0x21 || (0x23..=0x7e).contains(&b) || b >= 0x80
}

fn etaggify(value: &str, weak: bool) -> String {
    if weak {
        format!("W/\"{value}\"")
    } else {
        format!("\"{value}\"")
    }
}

fn etag_list_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?-u)^\s*(?:W/)?"[\x21\x23-\x7e\x80-\xff]+"(?:\s*,\s*(?:W/)?"[\x21\x23-\x7e\x80-\xff]+")*\s*$"#,
        )
        .expect("valid regex")
    })
}

fn etag_item_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?-u)(?:W/)?"[\x21\x23-\x7e\x80-\xff]+""#).expect("valid regex")
    })
}

/// The parsed value of an `If-Match` or `If-None-Match` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ETagMatch {
    /// The literal `*`.
    Any,
    /// A set of entity tags in wire form.
    Tags(HashSet<String>),
}

impl ETagMatch {
    /// Parses all occurrences of `header_name` in `headers`.
    ///
    /// Returns `Ok(None)` if the header is absent or empty.
    pub fn from_headers(
        headers: &HeaderMap,
        header_name: &'static str,
    ) -> Result<Option<Self>, PreconditionError> {
        let values: Vec<&[u8]> = headers
            .get_all(header_name)
            .iter()
            .map(|v| v.as_bytes())
            .collect();
        if values.is_empty() {
            return Ok(None);
        }
        let joined = values.join(&b","[..]);
        let trimmed = joined.trim_ascii();
        if trimmed.is_empty() {
            return Ok(None);
        }
        if trimmed == b"*" {
            return Ok(Some(Self::Any));
        }
        if !etag_list_pattern().is_match(trimmed) {
            return Err(PreconditionError::MalformedHeader {
                header: header_name,
                value: String::from_utf8_lossy(&joined).into_owned(),
            });
        }
        let tags = etag_item_pattern()
            .find_iter(trimmed)
            .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
            .collect();
        Ok(Some(Self::Tags(tags)))
    }

    pub fn contains(&self, tag: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Tags(tags) => tags.contains(tag),
        }
    }
}

/// Tags an integer, packed into the smallest two's-complement width that holds it.
pub fn etag_from_int(value: i64, weak: bool) -> ETag {
    let encoded = if let Ok(v) = i8::try_from(value) {
        URL_SAFE.encode(v.to_le_bytes())
    } else if let Ok(v) = i16::try_from(value) {
        URL_SAFE.encode(v.to_le_bytes())
    } else if let Ok(v) = i32::try_from(value) {
        URL_SAFE.encode(v.to_le_bytes())
    } else {
        URL_SAFE.encode(value.to_le_bytes())
    };
    ETag::Tag(etaggify(&encoded, weak))
}

/// Tags a float by its IEEE-754 binary64 representation.
pub fn etag_from_float(value: f64, weak: bool) -> ETag {
    ETag::Tag(etaggify(&URL_SAFE.encode(value.to_le_bytes()), weak))
}

/// Folds JSON-serializable values into a digest and turns it into an entity tag.
///
/// Every value is serialized as canonical JSON (object keys sorted) before it
/// is hashed, so logically equal values always produce the same tag.
#[derive(Clone, Default)]
pub struct ETagGenerator {
    hasher: Sha224,
}

impl ETagGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> Result<&mut Self, serde_json::Error> {
        let value = serde_json::to_value(value)?;
        let mut canonical = Vec::new();
        write_canonical(&value, &mut canonical)?;
        self.hasher.update(&canonical);
        Ok(self)
    }

    pub fn etag(&self) -> ETag {
        self.finish(false)
    }

    pub fn weak_etag(&self) -> ETag {
        self.finish(true)
    }

    fn finish(&self, weak: bool) -> ETag {
        let digest = self.hasher.clone().finalize();
        ETag::Tag(etaggify(&URL_SAFE.encode(digest), weak))
    }
}

fn write_canonical(value: &JsonValue, out: &mut Vec<u8>) -> Result<(), serde_json::Error> {
    match value {
        JsonValue::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            out.push(b'{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                serde_json::to_writer(&mut *out, key)?;
                out.push(b':');
                write_canonical(value, out)?;
            }
            out.push(b'}');
        }
        JsonValue::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out)?;
            }
            out.push(b']');
        }
        scalar => serde_json::to_writer(&mut *out, scalar)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use serde_json::json;
    use std::collections::{BTreeMap, HashMap};

    fn headers(name: &'static str, values: &[&str]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for value in values {
            map.append(name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_etag_from_int_widths() {
        assert_eq!(etag_from_int(0, false), ETag::Tag("\"AA==\"".into()));
        assert_eq!(etag_from_int(-1, false), ETag::Tag("\"_w==\"".into()));
        assert_eq!(etag_from_int(1, true), ETag::Tag("W/\"AQ==\"".into()));
        // 300 needs two bytes: 0x2c 0x01
        assert_eq!(etag_from_int(300, false), ETag::Tag("\"LAE=\"".into()));
        assert_ne!(etag_from_int(127, false), etag_from_int(128, false));
        let wide = etag_from_int(i64::MAX, false);
        assert_eq!(wide.as_str().map(str::len), Some(14));
    }

    #[test]
    fn test_etag_from_float() {
        assert_eq!(
            etag_from_float(0.0, false),
            ETag::Tag("\"AAAAAAAAAAA=\"".into())
        );
        assert_ne!(etag_from_float(1.5, false), etag_from_float(-1.5, false));
    }

    #[test]
    fn test_opaque_rejects_quotes() {
        assert_eq!(
            ETag::opaque("abc", false),
            Some(ETag::Tag("\"abc\"".into()))
        );
        assert_eq!(
            ETag::opaque("abc", true),
            Some(ETag::Tag("W/\"abc\"".into()))
        );
        assert_eq!(ETag::opaque("a\"b", false), None);
        assert_eq!(ETag::opaque("", false), None);
    }

    #[test]
    fn test_generator_is_order_independent() {
        let mut first = HashMap::new();
        let mut second = HashMap::new();
        for i in 0..32 {
            first.insert(format!("key{i}"), i);
        }
        for i in (0..32).rev() {
            second.insert(format!("key{i}"), i);
        }
        let a = ETagGenerator::new().update(&first).unwrap().etag();
        let b = ETagGenerator::new().update(&second).unwrap().etag();
        assert_eq!(a, b);

        #[derive(Serialize)]
        struct Role {
            name: &'static str,
            profiles: Vec<&'static str>,
        }
        let typed = Role {
            name: "admin",
            profiles: vec!["p1"],
        };
        let untyped: BTreeMap<&str, JsonValue> =
            [("profiles", json!(["p1"])), ("name", json!("admin"))].into();
        assert_eq!(
            ETagGenerator::new().update(&typed).unwrap().etag(),
            ETagGenerator::new().update(&untyped).unwrap().etag()
        );
    }

    #[test]
    fn test_generator_distinguishes_values() {
        let a = ETagGenerator::new()
            .update(&json!({"a": 1}))
            .unwrap()
            .etag();
        let b = ETagGenerator::new()
            .update(&json!({"a": 2}))
            .unwrap()
            .etag();
        assert_ne!(a, b);
        let weak = ETagGenerator::new()
            .update(&json!({"a": 1}))
            .unwrap()
            .weak_etag();
        assert!(weak.as_str().unwrap().starts_with("W/\""));
    }

    #[test]
    fn test_parse_if_header() {
        assert_eq!(
            ETagMatch::from_headers(&HeaderMap::new(), "if-match"),
            Ok(None)
        );
        assert_eq!(
            ETagMatch::from_headers(&headers("if-match", &[""]), "if-match"),
            Ok(None)
        );
        assert_eq!(
            ETagMatch::from_headers(&headers("if-match", &["*"]), "if-match"),
            Ok(Some(ETagMatch::Any))
        );
        let parsed = ETagMatch::from_headers(
            &headers("if-match", &["\"a\", W/\"b\"", "\"c\""]),
            "if-match",
        )
        .unwrap()
        .unwrap();
        assert!(parsed.contains("\"a\""));
        assert!(parsed.contains("W/\"b\""));
        assert!(parsed.contains("\"c\""));
        assert!(!parsed.contains("\"b\""));
    }

    #[test]
    fn test_parse_malformed_if_header() {
        assert!(matches!(
            ETagMatch::from_headers(&headers("if-none-match", &["abc"]), "if-none-match"),
            Err(PreconditionError::MalformedHeader {
                header: "if-none-match",
                ..
            })
        ));
        assert!(
            ETagMatch::from_headers(&headers("if-match", &["\"a\" \"b\""]), "if-match").is_err()
        );
        assert!(ETagMatch::from_headers(&headers("if-match", &["\"\""]), "if-match").is_err());
    }
}
