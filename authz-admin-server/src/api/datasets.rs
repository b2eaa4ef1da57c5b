use crate::config::{DatasetConfig, ScopeConfig};
use crate::state::AppState;
use async_trait::async_trait;
use hal_engine::{ETag, HalState, Relations, Resource, ResourceError, View};
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub(crate) const DATASETS: &str = "/datasets";
pub(crate) const DATASET: &str = "/datasets/{dataset}";
pub(crate) const SCOPE: &str = "/datasets/{dataset}/{scope}";

pub(crate) struct Datasets {
    view: View,
    state: AppState,
}

impl Datasets {
    pub(crate) fn build(state: &AppState, view: View) -> Result<Arc<dyn Resource>, ResourceError> {
        Ok(Arc::new(Self {
            view,
            state: state.clone(),
        }))
    }
}

#[async_trait]
impl Resource for Datasets {
    fn view(&self) -> &View {
        &self.view
    }

    fn link_title(&self) -> Option<String> {
        Some("Datasets".to_string())
    }

    async fn etag(&self) -> Result<ETag, ResourceError> {
        Ok(self.state.catalog_etag.clone())
    }

    async fn link_relations(&self) -> Result<Relations, ResourceError> {
        let registry = self.state.registry();
        let embed = self.view.sub_embed("item");
        let items = self
            .state
            .catalog()
            .datasets
            .iter()
            .map(|dataset| {
                registry.build(
                    &self.state,
                    DATASET,
                    &[("dataset", dataset.id.as_str())],
                    embed,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Relations::new().with("item", items))
    }
}

pub(crate) struct Dataset {
    view: View,
    state: AppState,
    dataset: DatasetConfig,
}

impl Dataset {
    pub(crate) fn build(state: &AppState, view: View) -> Result<Arc<dyn Resource>, ResourceError> {
        let dataset = view
            .param("dataset")
            .and_then(|id| state.catalog().dataset(id))
            .cloned()
            .ok_or_else(|| ResourceError::NotFound(Some("No such dataset".to_string())))?;
        Ok(Arc::new(Self {
            view,
            state: state.clone(),
            dataset,
        }))
    }
}

#[async_trait]
impl Resource for Dataset {
    fn view(&self) -> &View {
        &self.view
    }

    fn link_title(&self) -> Option<String> {
        Some(self.dataset.name.clone())
    }

    async fn etag(&self) -> Result<ETag, ResourceError> {
        Ok(self.state.catalog_etag.clone())
    }

    async fn attributes(&self) -> Result<Map<String, Value>, ResourceError> {
        Ok(describe(&self.dataset.name, self.dataset.description.as_deref()))
    }

    async fn link_relations(&self) -> Result<Relations, ResourceError> {
        let registry = self.state.registry();
        let embed = self.view.sub_embed("scope");
        let scopes = self
            .dataset
            .scopes
            .iter()
            .map(|scope| {
                registry.build(
                    &self.state,
                    SCOPE,
                    &[
                        ("dataset", self.dataset.id.as_str()),
                        ("scope", scope.id.as_str()),
                    ],
                    embed,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Relations::new().with("scope", scopes))
    }
}

/// A scope within a dataset. Scopes may include one other scope of the same
/// dataset, e.g. write access including read access.
pub(crate) struct Scope {
    view: View,
    state: AppState,
    dataset: DatasetConfig,
    scope: ScopeConfig,
}

impl Scope {
    pub(crate) fn build(state: &AppState, view: View) -> Result<Arc<dyn Resource>, ResourceError> {
        let dataset = view
            .param("dataset")
            .and_then(|id| state.catalog().dataset(id))
            .ok_or_else(|| ResourceError::NotFound(Some("No such dataset".to_string())))?;
        let scope = view
            .param("scope")
            .and_then(|id| dataset.scopes.iter().find(|scope| scope.id == id))
            .cloned()
            .ok_or_else(|| ResourceError::NotFound(Some("No such scope".to_string())))?;
        let dataset = dataset.clone();
        Ok(Arc::new(Self {
            view,
            state: state.clone(),
            dataset,
            scope,
        }))
    }

    fn sibling(&self, relation: &str, scope: &str) -> Result<Arc<dyn Resource>, ResourceError> {
        self.state.registry().build(
            &self.state,
            SCOPE,
            &[("dataset", self.dataset.id.as_str()), ("scope", scope)],
            self.view.sub_embed(relation),
        )
    }
}

#[async_trait]
impl Resource for Scope {
    fn view(&self) -> &View {
        &self.view
    }

    fn link_name(&self) -> Option<String> {
        Some(format!("{}.{}", self.dataset.id, self.scope.id))
    }

    fn link_title(&self) -> Option<String> {
        Some(format!("{} (for dataset {})", self.scope.name, self.dataset.name))
    }

    async fn etag(&self) -> Result<ETag, ResourceError> {
        Ok(self.state.catalog_etag.clone())
    }

    async fn attributes(&self) -> Result<Map<String, Value>, ResourceError> {
        Ok(describe(&self.scope.name, self.scope.description.as_deref()))
    }

    async fn link_relations(&self) -> Result<Relations, ResourceError> {
        let dataset = self.state.registry().build(
            &self.state,
            DATASET,
            &[("dataset", self.dataset.id.as_str())],
            self.view.sub_embed("dataset"),
        )?;
        let mut relations = Relations::new().with("dataset", dataset);
        if let Some(included) = &self.scope.includes {
            relations.insert("includes", self.sibling("includes", included)?);
        }
        let included_by = self
            .dataset
            .scopes
            .iter()
            .filter(|scope| scope.includes.as_deref() == Some(self.scope.id.as_str()))
            .map(|scope| self.sibling("included_by", &scope.id))
            .collect::<Result<Vec<_>, _>>()?;
        if !included_by.is_empty() {
            relations.insert("included_by", included_by);
        }
        Ok(relations)
    }
}

fn describe(name: &str, description: Option<&str>) -> Map<String, Value> {
    let mut attributes = Map::new();
    attributes.insert("name".to_string(), json!(name));
    if let Some(description) = description {
        attributes.insert("description".to_string(), json!(description));
    }
    attributes
}
