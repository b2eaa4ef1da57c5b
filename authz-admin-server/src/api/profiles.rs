use crate::api::datasets::SCOPE;
use crate::api::roles::ROLE;
use crate::config::catalog::split_scope;
use crate::config::ProfileConfig;
use crate::state::AppState;
use async_trait::async_trait;
use hal_engine::{ETag, HalState, Relations, Resource, ResourceError, View};
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub(crate) const PROFILES: &str = "/profiles";
pub(crate) const PROFILE: &str = "/profiles/{profile}";

pub(crate) struct Profiles {
    view: View,
    state: AppState,
}

impl Profiles {
    pub(crate) fn build(state: &AppState, view: View) -> Result<Arc<dyn Resource>, ResourceError> {
        Ok(Arc::new(Self {
            view,
            state: state.clone(),
        }))
    }
}

#[async_trait]
impl Resource for Profiles {
    fn view(&self) -> &View {
        &self.view
    }

    fn link_title(&self) -> Option<String> {
        Some("Profiles".to_string())
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
            .profiles
            .iter()
            .map(|profile| {
                registry.build(
                    &self.state,
                    PROFILE,
                    &[("profile", profile.id.as_str())],
                    embed,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Relations::new().with("item", items))
    }
}

/// A named set of scopes, granted through roles
pub(crate) struct Profile {
    view: View,
    state: AppState,
    profile: ProfileConfig,
}

impl Profile {
    pub(crate) fn build(state: &AppState, view: View) -> Result<Arc<dyn Resource>, ResourceError> {
        let profile = view
            .param("profile")
            .and_then(|id| state.catalog().profile(id))
            .cloned()
            .ok_or_else(ResourceError::not_found)?;
        Ok(Arc::new(Self {
            view,
            state: state.clone(),
            profile,
        }))
    }
}

#[async_trait]
impl Resource for Profile {
    fn view(&self) -> &View {
        &self.view
    }

    fn link_title(&self) -> Option<String> {
        Some(self.profile.name.clone())
    }

    async fn etag(&self) -> Result<ETag, ResourceError> {
        Ok(self.state.catalog_etag.clone())
    }

    async fn attributes(&self) -> Result<Map<String, Value>, ResourceError> {
        let mut attributes = Map::new();
        attributes.insert("name".to_string(), json!(self.profile.name));
        if let Some(description) = &self.profile.description {
            attributes.insert("description".to_string(), json!(description));
        }
        Ok(attributes)
    }

    async fn link_relations(&self) -> Result<Relations, ResourceError> {
        let registry = self.state.registry();

        let embed = self.view.sub_embed("scope");
        let mut scopes = Vec::with_capacity(self.profile.scopes.len());
        for scope in &self.profile.scopes {
            let (dataset, scope) = split_scope(scope).ok_or_else(|| {
                ResourceError::internal(format!(
                    "Malformed scope {scope} in profile {}",
                    self.profile.id
                ))
            })?;
            scopes.push(registry.build(
                &self.state,
                SCOPE,
                &[("dataset", dataset), ("scope", scope)],
                embed,
            )?);
        }

        let embed = self.view.sub_embed("role");
        let roles = self
            .state
            .catalog()
            .roles_with_profile(&self.profile.id)
            .map(|role| registry.build(&self.state, ROLE, &[("role", role.id.as_str())], embed))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Relations::new().with("scope", scopes).with("role", roles))
    }
}
