//! Per-request views: the matched template with its path parameters, the
//! query string and the parsed `embed` parameter of a resource.

use std::sync::{Arc, OnceLock};

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use tokio::sync::OnceCell;

use crate::embed::{EmbedParser, EmbedSpec};
use crate::error::EmbedError;
use crate::etag::ETag;

/// Characters escaped in query keys and values. Parentheses and commas stay
/// readable so that `embed=a(b,c)` survives as is.
const QUERY_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Canonical URL policy for query parameters that equal their default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultQueryPolicy {
    /// Leave them out.
    Elide,
    /// List every defaulted parameter explicitly.
    Restate,
}

/// The request-scoped addressing state of a resource: where it lives, how
/// it was matched, what the client asked to embed.
pub struct View {
    template: Arc<str>,
    path: String,
    query: Vec<(String, String)>,
    params: Vec<(String, String)>,
    defaults: Arc<[(String, String)]>,
    parser: EmbedParser,
    policy: DefaultQueryPolicy,
    embed: OnceLock<Result<EmbedSpec, EmbedError>>,
    etag: OnceCell<ETag>,
}

impl View {
    /// `path` is percent-encoded as on the wire; `query` and `params` are decoded.
    pub(crate) fn new(
        template: Arc<str>,
        path: String,
        query: Vec<(String, String)>,
        params: Vec<(String, String)>,
        defaults: Arc<[(String, String)]>,
        parser: EmbedParser,
        policy: DefaultQueryPolicy,
    ) -> Self {
        Self {
            template,
            path,
            query,
            params,
            defaults,
            parser,
            policy,
            embed: OnceLock::new(),
            etag: OnceCell::new(),
        }
    }

    /// The path template this view was matched against, e.g. `/accounts/{account}`.
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// A path parameter extracted from the template match.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// The query exactly as requested.
    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    /// The requested query with defaults filled in for missing keys.
    pub fn effective_query(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<(&str, &str)> = self
            .defaults
            .iter()
            .filter(|(key, _)| !self.query.iter().any(|(k, _)| k == key))
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        pairs.extend(self.query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        pairs
    }

    /// The first value of query parameter `key`, or its default.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .chain(self.defaults.iter())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The parsed `embed` parameter. Occurrences are joined with commas,
    /// empty ones are skipped. Parsed on first use.
    pub fn embed(&self) -> Result<&EmbedSpec, EmbedError> {
        self.embed
            .get_or_init(|| {
                let joined = self
                    .effective_query()
                    .into_iter()
                    .filter(|(k, v)| *k == "embed" && !v.is_empty())
                    .map(|(_, v)| v)
                    .collect::<Vec<_>>()
                    .join(",");
                self.parser.parse(&joined)
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    pub fn embeds(&self, relation: &str) -> bool {
        self.embed().is_ok_and(|spec| spec.contains(relation))
    }

    /// The nested embed query to pass on to the resources of `relation`.
    pub fn sub_embed(&self, relation: &str) -> Option<&str> {
        self.embed().ok()?.sub_query(relation)
    }

    /// The last non-empty path segment, decoded.
    pub fn name(&self) -> String {
        let segment = self
            .path
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or_default();
        percent_decode_str(segment).decode_utf8_lossy().into_owned()
    }

    /// The URL as requested, relative to the server root.
    pub fn rel_url(&self) -> String {
        let pairs: Vec<(&str, &str)> = self
            .query
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        with_query(&self.path, &pairs)
    }

    /// The URL that identifies this resource regardless of how defaulted
    /// query parameters were spelled. Parameters are ordered by key.
    pub fn canonical_url(&self) -> String {
        let mut pairs: Vec<(&str, &str)> = match self.policy {
            DefaultQueryPolicy::Restate => self.effective_query(),
            DefaultQueryPolicy::Elide => self
                .query
                .iter()
                .filter(|(k, v)| !self.defaults.iter().any(|(dk, dv)| dk == k && dv == v))
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect(),
        };
        pairs.sort_by_key(|(k, _)| *k);
        with_query(&self.path, &pairs)
    }

    pub(crate) fn etag_cell(&self) -> &OnceCell<ETag> {
        &self.etag
    }
}

fn with_query(path: &str, pairs: &[(&str, &str)]) -> String {
    if pairs.is_empty() {
        return path.to_string();
    }
    let query = pairs
        .iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                utf8_percent_encode(k, QUERY_ENCODE_SET),
                utf8_percent_encode(v, QUERY_ENCODE_SET)
            )
        })
        .collect::<Vec<_>>()
        .join("&");
    format!("{path}?{query}")
}
