//! The write-once table of resource types, keyed by path template.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use regex::Regex;
use url::{Url, form_urlencoded};

use super::Resource;
use super::view::{DefaultQueryPolicy, View};
use crate::embed::{DEFAULT_MAX_QUERY_DEPTH, EmbedParser};
use crate::error::{RegistryError, ResourceError};
use crate::json::{DEFAULT_CHUNK_SIZE, EncoderOptions};

/// Characters escaped when a parameter is substituted into a path segment.
const SEGMENT_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Builds a resource for a matched view. `S` is the application state.
pub type Factory<S> =
    Arc<dyn Fn(&S, View) -> Result<Arc<dyn Resource>, ResourceError> + Send + Sync>;

fn placeholder_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"))
}

struct Entry<S> {
    template: Arc<str>,
    /// `None` for plain templates without placeholders.
    pattern: Option<Regex>,
    placeholders: Vec<String>,
    defaults: Arc<[(String, String)]>,
    factory: Factory<S>,
}

impl<S> Entry<S> {
    fn new(template: String, factory: Factory<S>) -> Result<Self, RegistryError> {
        if !template.starts_with('/') {
            return Err(RegistryError::InvalidTemplate(template));
        }
        let mut regex = String::from("^");
        let mut placeholders = Vec::new();
        let mut last = 0;
        for captures in placeholder_pattern().captures_iter(&template) {
            let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            let literal = &template[last..whole.start()];
            if literal.contains(['{', '}']) || placeholders.iter().any(|p| p == name.as_str()) {
                return Err(RegistryError::InvalidTemplate(template));
            }
            regex.push_str(&regex::escape(literal));
            regex.push_str(&format!("(?P<{}>[^/]+)", name.as_str()));
            placeholders.push(name.as_str().to_string());
            last = whole.end();
        }
        let tail = &template[last..];
        if tail.contains(['{', '}']) {
            return Err(RegistryError::InvalidTemplate(template));
        }
        let pattern = if placeholders.is_empty() {
            None
        } else {
            regex.push_str(&regex::escape(tail));
            regex.push('$');
            let compiled =
                Regex::new(&regex).map_err(|_| RegistryError::InvalidTemplate(template.clone()))?;
            Some(compiled)
        };
        Ok(Self {
            template: Arc::from(template),
            pattern,
            placeholders,
            defaults: Arc::from(Vec::new()),
            factory,
        })
    }

    fn url_for(&self, params: &[(&str, &str)]) -> Result<String, RegistryError> {
        let mut url = self.template.to_string();
        for name in &self.placeholders {
            let value = params
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| *v)
                .ok_or_else(|| RegistryError::MissingParameter {
                    template: self.template.to_string(),
                    param: name.clone(),
                })?;
            let encoded = utf8_percent_encode(value, SEGMENT_ENCODE_SET).to_string();
            url = url.replace(&format!("{{{name}}}"), &encoded);
        }
        Ok(url)
    }
}

/// A successful [`Registry::match_path`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatch<'a> {
    pub template: &'a str,
    /// Decoded path parameters.
    pub params: Vec<(String, String)>,
}

pub struct RegistryBuilder<S> {
    entries: Vec<(String, Factory<S>)>,
    defaults: Vec<(String, String, String)>,
    max_query_depth: usize,
    chunk_size: usize,
    allow_nan: bool,
    policy: DefaultQueryPolicy,
}

impl<S> Default for RegistryBuilder<S> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            defaults: Vec::new(),
            max_query_depth: DEFAULT_MAX_QUERY_DEPTH,
            chunk_size: DEFAULT_CHUNK_SIZE,
            allow_nan: false,
            policy: DefaultQueryPolicy::Elide,
        }
    }
}

impl<S> RegistryBuilder<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_query_depth(mut self, max_query_depth: usize) -> Self {
        self.max_query_depth = max_query_depth;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_allow_nan(mut self, allow_nan: bool) -> Self {
        self.allow_nan = allow_nan;
        self
    }

    /// Whether canonical URLs list defaulted query parameters explicitly.
    pub fn with_restate_defaults(mut self, restate: bool) -> Self {
        self.policy = if restate {
            DefaultQueryPolicy::Restate
        } else {
            DefaultQueryPolicy::Elide
        };
        self
    }

    /// Registers a resource type under `template`, e.g. `/accounts/{account}`.
    pub fn register<F>(mut self, template: &str, factory: F) -> Self
    where
        F: Fn(&S, View) -> Result<Arc<dyn Resource>, ResourceError> + Send + Sync + 'static,
    {
        self.entries.push((template.to_string(), Arc::new(factory)));
        self
    }

    /// Declares the default value of query parameter `key` for `template`.
    pub fn with_default(mut self, template: &str, key: &str, value: &str) -> Self {
        self.defaults
            .push((template.to_string(), key.to_string(), value.to_string()));
        self
    }

    pub fn build(self) -> Result<Registry<S>, RegistryError> {
        let mut entries: Vec<Entry<S>> = Vec::with_capacity(self.entries.len());
        let mut by_template = HashMap::new();
        for (template, factory) in self.entries {
            if by_template.contains_key(&template) {
                return Err(RegistryError::InvalidTemplate(template));
            }
            by_template.insert(template.clone(), entries.len());
            entries.push(Entry::new(template, factory)?);
        }

        let mut defaults: HashMap<usize, Vec<(String, String)>> = HashMap::new();
        for (template, key, value) in self.defaults {
            let index = *by_template
                .get(&template)
                .ok_or(RegistryError::UnknownTemplate(template))?;
            defaults.entry(index).or_default().push((key, value));
        }
        for (index, pairs) in defaults {
            entries[index].defaults = pairs.into();
        }

        let plain = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.pattern.is_none())
            .map(|(i, e)| (e.template.to_string(), i))
            .collect::<HashMap<_, _>>();
        let dynamic = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.pattern.is_some())
            .map(|(i, _)| i)
            .collect::<Vec<_>>();
        log::debug!(
            "Resource registry built: {} plain and {} dynamic templates",
            plain.len(),
            dynamic.len()
        );

        Ok(Registry {
            entries,
            by_template,
            plain,
            dynamic,
            parser: EmbedParser::new(self.max_query_depth),
            encoder: EncoderOptions {
                chunk_size: self.chunk_size,
                allow_nan: self.allow_nan,
            },
            policy: self.policy,
        })
    }
}

/// Resource types by path template.
///
/// Plain templates match by exact path; dynamic ones are tried in
/// registration order. Built once at start-up and read-only afterwards.
pub struct Registry<S> {
    entries: Vec<Entry<S>>,
    by_template: HashMap<String, usize>,
    plain: HashMap<String, usize>,
    dynamic: Vec<usize>,
    parser: EmbedParser,
    encoder: EncoderOptions,
    policy: DefaultQueryPolicy,
}

impl<S> Registry<S> {
    pub fn builder() -> RegistryBuilder<S> {
        RegistryBuilder::new()
    }

    pub fn encoder_options(&self) -> EncoderOptions {
        self.encoder
    }

    pub fn embed_parser(&self) -> EmbedParser {
        self.parser
    }

    pub fn templates(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| &*e.template)
    }

    fn entry(&self, template: &str) -> Result<&Entry<S>, RegistryError> {
        self.by_template
            .get(template)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| RegistryError::UnknownTemplate(template.to_string()))
    }

    fn match_entry(&self, path: &str) -> Option<(&Entry<S>, Vec<(String, String)>)> {
        if let Some(&index) = self.plain.get(path) {
            return Some((&self.entries[index], Vec::new()));
        }
        self.dynamic.iter().find_map(|&index| {
            let entry = &self.entries[index];
            let captures = entry.pattern.as_ref()?.captures(path)?;
            let params = entry
                .placeholders
                .iter()
                .map(|name| {
                    let raw = captures.name(name).map_or("", |m| m.as_str());
                    let value = percent_decode_str(raw).decode_utf8_lossy().into_owned();
                    (name.clone(), value)
                })
                .collect();
            Some((entry, params))
        })
    }

    /// Finds the template for a percent-encoded request path.
    pub fn match_path(&self, path: &str) -> Option<PathMatch<'_>> {
        self.match_entry(path).map(|(entry, params)| PathMatch {
            template: &entry.template,
            params,
        })
    }

    /// Formats the path of `template` with `params` substituted.
    pub fn url_for(
        &self,
        template: &str,
        params: &[(&str, &str)],
    ) -> Result<String, RegistryError> {
        self.entry(template)?.url_for(params)
    }

    /// A view on `template`, optionally asking for `embed` in its query.
    pub fn view(
        &self,
        template: &str,
        params: &[(&str, &str)],
        embed: Option<&str>,
    ) -> Result<View, RegistryError> {
        let entry = self.entry(template)?;
        let path = entry.url_for(params)?;
        let query = embed
            .map(|embed| vec![("embed".to_string(), embed.to_string())])
            .unwrap_or_default();
        let params = params
            .iter()
            .filter(|(name, _)| entry.placeholders.iter().any(|p| p == name))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Ok(self.new_view(entry, path, query, params))
    }

    /// The view for a request path and raw query string, if any template matches.
    pub fn view_for(&self, path: &str, query: Option<&str>) -> Option<View> {
        let (entry, params) = self.match_entry(path)?;
        let query = query
            .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        Some(self.new_view(entry, path.to_string(), query, params))
    }

    fn new_view(
        &self,
        entry: &Entry<S>,
        path: String,
        query: Vec<(String, String)>,
        params: Vec<(String, String)>,
    ) -> View {
        View::new(
            entry.template.clone(),
            path,
            query,
            params,
            entry.defaults.clone(),
            self.parser,
            self.policy,
        )
    }

    /// Constructs the resource registered under `template`.
    pub fn build(
        &self,
        state: &S,
        template: &str,
        params: &[(&str, &str)],
        embed: Option<&str>,
    ) -> Result<Arc<dyn Resource>, ResourceError> {
        let entry = self.entry(template)?;
        let view = self.view(template, params, embed)?;
        (entry.factory)(state, view)
    }

    /// Constructs the resource for a request path and raw query string.
    ///
    /// Fails with `404 Not Found` if no template matches.
    pub fn build_for(
        &self,
        state: &S,
        path: &str,
        query: Option<&str>,
    ) -> Result<Arc<dyn Resource>, ResourceError> {
        let view = self
            .view_for(path, query)
            .ok_or_else(ResourceError::not_found)?;
        let entry = self.entry(view.template())?;
        (entry.factory)(state, view)
    }

    /// Constructs the resource an href points to. Absolute hrefs are
    /// accepted, only their path and query are used.
    pub fn resolve(&self, state: &S, href: &str) -> Result<Arc<dyn Resource>, ResourceError> {
        let base = Url::parse("http://localhost/").map_err(ResourceError::internal)?;
        let url = base
            .join(href)
            .map_err(|e| ResourceError::bad_request(format!("Invalid URL '{href}': {e}")))?;
        self.build_for(state, url.path(), url.query())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Link;
    use async_trait::async_trait;

    struct Thing {
        view: View,
    }

    #[async_trait]
    impl Resource for Thing {
        fn view(&self) -> &View {
            &self.view
        }
    }

    fn thing(_: &(), view: View) -> Result<Arc<dyn Resource>, ResourceError> {
        if view.param("thing") == Some("missing") {
            return Err(ResourceError::not_found());
        }
        Ok(Arc::new(Thing { view }))
    }

    fn registry() -> Registry<()> {
        RegistryBuilder::new()
            .register("/", thing)
            .register("/things", thing)
            .register("/things/{thing}", thing)
            .register("/things/{thing}/parts/{part}", thing)
            .with_default("/things", "page", "1")
            .build()
            .unwrap()
    }

    #[test]
    fn test_match_path() {
        let registry = registry();
        assert_eq!(registry.match_path("/").unwrap().template, "/");
        let m = registry.match_path("/things/a%20b").unwrap();
        assert_eq!(m.template, "/things/{thing}");
        assert_eq!(m.params, vec![("thing".to_string(), "a b".to_string())]);
        let m = registry.match_path("/things/x/parts/y").unwrap();
        assert_eq!(m.template, "/things/{thing}/parts/{part}");
        assert_eq!(m.params.len(), 2);
        assert!(registry.match_path("/things/x/y").is_none());
        assert!(registry.match_path("/other").is_none());
    }

    #[test]
    fn test_url_for() {
        let registry = registry();
        assert_eq!(
            registry.url_for("/things/{thing}", &[("thing", "a/b c")]),
            Ok("/things/a%2Fb%20c".to_string())
        );
        assert_eq!(
            registry.url_for("/things/{thing}", &[]),
            Err(RegistryError::MissingParameter {
                template: "/things/{thing}".into(),
                param: "thing".into()
            })
        );
        assert!(matches!(
            registry.url_for("/nope", &[]),
            Err(RegistryError::UnknownTemplate(_))
        ));
    }

    #[test]
    fn test_url_round_trips_through_match() {
        let registry = registry();
        let url = registry
            .url_for("/things/{thing}", &[("thing", "ü/?")])
            .unwrap();
        let m = registry.match_path(&url).unwrap();
        assert_eq!(m.params[0].1, "ü/?");
    }

    #[test]
    fn test_view_with_embed_and_defaults() {
        let registry = registry();
        let view = registry.view("/things", &[], Some("item(part)")).unwrap();
        assert_eq!(view.canonical_url(), "/things?embed=item(part)");
        assert_eq!(view.sub_embed("item"), Some("part"));
        let view = registry
            .view_for("/things", Some("page=1&embed=item"))
            .unwrap();
        assert_eq!(view.canonical_url(), "/things?embed=item");
    }

    #[test]
    fn test_build_and_resolve() {
        let registry = registry();
        let resource = registry
            .resolve(&(), "http://example.com/things/x?embed=a")
            .unwrap();
        assert_eq!(resource.view().param("thing"), Some("x"));
        assert!(resource.view().embeds("a"));
        assert_eq!(
            resource.to_link(),
            Link::new("/things/x?embed=a").with_name("x")
        );
        let missing = registry.build(&(), "/things/{thing}", &[("thing", "missing")], None);
        assert!(matches!(missing, Err(ResourceError::NotFound(_))));
        let unknown = registry.resolve(&(), "/elsewhere");
        assert!(matches!(unknown, Err(ResourceError::NotFound(_))));
    }

    #[test]
    fn test_invalid_templates() {
        let build = |template: &str| RegistryBuilder::<()>::new().register(template, thing).build();
        assert!(matches!(build("things"), Err(RegistryError::InvalidTemplate(_))));
        assert!(matches!(build("/a/{b"), Err(RegistryError::InvalidTemplate(_))));
        assert!(matches!(build("/a/{b}/{b}"), Err(RegistryError::InvalidTemplate(_))));
        assert!(matches!(build("/a/{1b}"), Err(RegistryError::InvalidTemplate(_))));
        let unknown_default = RegistryBuilder::<()>::new()
            .register("/", thing)
            .with_default("/x", "k", "v")
            .build();
        assert!(matches!(unknown_default, Err(RegistryError::UnknownTemplate(_))));
    }
}
