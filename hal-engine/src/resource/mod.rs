//! The resource abstraction: domain objects that know their attributes and
//! link relations, rendered into HAL documents by [`document::to_document`].

pub mod document;
pub mod registry;
pub mod view;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::ResourceError;
use crate::etag::ETag;

pub use document::to_document;
pub use registry::{Registry, RegistryBuilder};
pub use view::View;

/// A HAL link object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub title: Option<String>,
}

impl Link {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            name: None,
            title: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// An addressable entity, constructed per request around its [`View`].
#[async_trait]
pub trait Resource: Send + Sync {
    fn view(&self) -> &View;

    fn link_title(&self) -> Option<String> {
        None
    }

    fn link_name(&self) -> Option<String> {
        let name = self.view().name();
        (!name.is_empty()).then_some(name)
    }

    /// The resource's entity-tag state. Called at most once per instance
    /// through [`current_etag`].
    async fn etag(&self) -> Result<ETag, ResourceError> {
        Ok(ETag::Unknown)
    }

    async fn attributes(&self) -> Result<Map<String, JsonValue>, ResourceError> {
        Ok(Map::new())
    }

    /// Relation name to target(s). Called once per rendering; whether a
    /// relation ends up in `_links` or `_embedded` is decided by the caller.
    async fn link_relations(&self) -> Result<Relations, ResourceError> {
        Ok(Relations::new())
    }

    fn to_link(&self) -> Link {
        Link {
            href: self.view().canonical_url(),
            name: self.link_name(),
            title: self.link_title(),
        }
    }
}

/// Returns the entity tag of `resource`, computing it only once per instance.
pub async fn current_etag(resource: &dyn Resource) -> Result<ETag, ResourceError> {
    resource
        .view()
        .etag_cell()
        .get_or_try_init(|| resource.etag())
        .await
        .cloned()
}

/// The target of a single link relation.
pub enum Relation {
    Resource(Arc<dyn Resource>),
    Link(Link),
    /// May mix resources and plain links; only the resources can be embedded.
    Items(Vec<RelationItem>),
    /// Lazily produced resources, e.g. rows streamed from a store.
    Stream(BoxStream<'static, Result<Arc<dyn Resource>, ResourceError>>),
}

pub enum RelationItem {
    Resource(Arc<dyn Resource>),
    Link(Link),
}

impl From<Arc<dyn Resource>> for Relation {
    fn from(resource: Arc<dyn Resource>) -> Self {
        Self::Resource(resource)
    }
}

impl From<Link> for Relation {
    fn from(link: Link) -> Self {
        Self::Link(link)
    }
}

impl From<Vec<Arc<dyn Resource>>> for Relation {
    fn from(resources: Vec<Arc<dyn Resource>>) -> Self {
        Self::Items(resources.into_iter().map(RelationItem::Resource).collect())
    }
}

impl From<Vec<Link>> for Relation {
    fn from(links: Vec<Link>) -> Self {
        Self::Items(links.into_iter().map(RelationItem::Link).collect())
    }
}

/// Link relations in the order they should be rendered.
#[derive(Default)]
pub struct Relations(Vec<(String, Relation)>);

impl Relations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a relation, replacing an earlier one with the same name.
    pub fn with(mut self, name: impl Into<String>, relation: impl Into<Relation>) -> Self {
        self.insert(name, relation);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, relation: impl Into<Relation>) {
        let name = name.into();
        let relation = relation.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = relation,
            None => self.0.push((name, relation)),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|(n, _)| n == name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for Relations {
    type Item = (String, Relation);
    type IntoIter = std::vec::IntoIter<(String, Relation)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
