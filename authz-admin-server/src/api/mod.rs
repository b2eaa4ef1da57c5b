pub(crate) mod accounts;
pub(crate) mod datasets;
pub(crate) mod health;
pub(crate) mod profiles;
pub(crate) mod roles;
pub(crate) mod root;

use crate::config::HalConfig;
use crate::state::AppState;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use axum::{routing::get, Router};
use hal_engine::{resource_handler, Registry, RegistryBuilder, RegistryError};
use http::header::ACCESS_CONTROL_ALLOW_ORIGIN;
use http::HeaderValue;

/// Combines all API routes into a single router
pub(super) fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(resource_routes())
}

/// Every resource type is served by the generic GET/HEAD handler; accounts
/// are also writable.
fn resource_routes() -> Router<AppState> {
    let resource = || get(resource_handler::<AppState>);
    Router::new()
        .route(root::ROOT, resource())
        .route(accounts::ACCOUNTS, resource())
        .route(
            accounts::ACCOUNT,
            resource()
                .put(accounts::put_account)
                .delete(accounts::delete_account),
        )
        .route(datasets::DATASETS, resource())
        .route(datasets::DATASET, resource())
        .route(datasets::SCOPE, resource())
        .route(profiles::PROFILES, resource())
        .route(profiles::PROFILE, resource())
        .route(roles::ROLES, resource())
        .route(roles::ROLE, resource())
}

/// The resource types, keyed by the same templates the router uses
pub(crate) fn registry(hal: &HalConfig) -> Result<Registry<AppState>, RegistryError> {
    RegistryBuilder::new()
        .with_max_query_depth(hal.max_query_depth)
        .with_chunk_size(hal.json_chunk_size)
        .with_allow_nan(hal.allow_nan)
        .with_restate_defaults(hal.restate_default_query)
        .register(root::ROOT, root::Root::build)
        .register(accounts::ACCOUNTS, accounts::Accounts::build)
        .register(accounts::ACCOUNT, accounts::Account::build)
        .register(datasets::DATASETS, datasets::Datasets::build)
        .register(datasets::DATASET, datasets::Dataset::build)
        .register(datasets::SCOPE, datasets::Scope::build)
        .register(profiles::PROFILES, profiles::Profiles::build)
        .register(profiles::PROFILE, profiles::Profile::build)
        .register(roles::ROLES, roles::Roles::build)
        .register(roles::ROLE, roles::Role::build)
        .build()
}

/// Adds `Access-Control-Allow-Origin: *` to every response
pub(crate) async fn allow_any_origin(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}
