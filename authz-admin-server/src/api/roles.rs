use crate::api::accounts::{Account, ACCOUNT};
use crate::api::profiles::PROFILE;
use crate::config::RoleConfig;
use crate::state::AppState;
use async_trait::async_trait;
use futures::StreamExt;
use hal_engine::{ETag, HalState, Relation, Relations, Resource, ResourceError, View};
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub(crate) const ROLES: &str = "/roles";
pub(crate) const ROLE: &str = "/roles/{role}";

pub(crate) struct Roles {
    view: View,
    state: AppState,
}

impl Roles {
    pub(crate) fn build(state: &AppState, view: View) -> Result<Arc<dyn Resource>, ResourceError> {
        Ok(Arc::new(Self {
            view,
            state: state.clone(),
        }))
    }
}

#[async_trait]
impl Resource for Roles {
    fn view(&self) -> &View {
        &self.view
    }

    fn link_title(&self) -> Option<String> {
        Some("ADW Rollen".to_string())
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
            .roles
            .iter()
            .map(|role| registry.build(&self.state, ROLE, &[("role", role.id.as_str())], embed))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Relations::new().with("item", items))
    }
}

/// A role from the catalogue, with the profiles it grants and the accounts holding it
pub(crate) struct Role {
    view: View,
    state: AppState,
    role: RoleConfig,
}

impl Role {
    pub(crate) fn build(state: &AppState, view: View) -> Result<Arc<dyn Resource>, ResourceError> {
        let role = view
            .param("role")
            .and_then(|id| state.catalog().role(id))
            .cloned()
            .ok_or_else(ResourceError::not_found)?;
        Ok(Arc::new(Self {
            view,
            state: state.clone(),
            role,
        }))
    }
}

#[async_trait]
impl Resource for Role {
    fn view(&self) -> &View {
        &self.view
    }

    fn link_title(&self) -> Option<String> {
        Some(self.role.name.clone())
    }

    async fn etag(&self) -> Result<ETag, ResourceError> {
        Ok(self.state.catalog_etag.clone())
    }

    async fn attributes(&self) -> Result<Map<String, Value>, ResourceError> {
        let mut attributes = Map::new();
        attributes.insert("name".to_string(), json!(self.role.name));
        if let Some(description) = &self.role.description {
            attributes.insert("description".to_string(), json!(description));
        }
        Ok(attributes)
    }

    async fn link_relations(&self) -> Result<Relations, ResourceError> {
        let registry = self.state.registry();
        let embed = self.view.sub_embed("profile");
        let profiles = self
            .role
            .profiles
            .iter()
            .map(|profile| {
                registry.build(
                    &self.state,
                    PROFILE,
                    &[("profile", profile.as_str())],
                    embed,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let state = self.state.clone();
        let embed = self.view.sub_embed("account").map(str::to_string);
        let accounts = self
            .state
            .store
            .accounts(Some(vec![self.role.id.clone()]))
            .map(move |record| -> Result<Arc<dyn Resource>, ResourceError> {
                let view = state.registry.view(
                    ACCOUNT,
                    &[("account", record.account_id.as_str())],
                    embed.as_deref(),
                )?;
                Ok(Arc::new(Account::with_record(view, state.clone(), record)))
            });

        Ok(Relations::new()
            .with("profile", profiles)
            .with("account", Relation::Stream(accounts.boxed())))
    }
}
