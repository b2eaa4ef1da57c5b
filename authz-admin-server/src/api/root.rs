use crate::api::{accounts, datasets, profiles, roles};
use crate::state::AppState;
use async_trait::async_trait;
use hal_engine::{ETag, HalState, Relations, Resource, ResourceError, View};
use std::sync::Arc;

pub(crate) const ROOT: &str = "/";

/// Entry point of the API, linking to every collection
pub(crate) struct Root {
    view: View,
    state: AppState,
}

impl Root {
    pub(crate) fn build(state: &AppState, view: View) -> Result<Arc<dyn Resource>, ResourceError> {
        Ok(Arc::new(Self {
            view,
            state: state.clone(),
        }))
    }
}

#[async_trait]
impl Resource for Root {
    fn view(&self) -> &View {
        &self.view
    }

    fn link_title(&self) -> Option<String> {
        Some("Authorization Administration API".to_string())
    }

    async fn etag(&self) -> Result<ETag, ResourceError> {
        Ok(ETag::Unsupported)
    }

    async fn link_relations(&self) -> Result<Relations, ResourceError> {
        let registry = self.state.registry();
        let mut relations = Relations::new();
        for (relation, template) in [
            ("accounts", accounts::ACCOUNTS),
            ("datasets", datasets::DATASETS),
            ("profiles", profiles::PROFILES),
            ("roles", roles::ROLES),
        ] {
            let target = registry.build(&self.state, template, &[], self.view.sub_embed(relation))?;
            relations.insert(relation, target);
        }
        Ok(relations)
    }
}
