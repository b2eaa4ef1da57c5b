use crate::api::roles::ROLE;
use crate::errors::ApiError;
use crate::openapi::ACCOUNTS_TAG;
use crate::state::AppState;
use crate::store::AccountRecord;
use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::StreamExt;
use hal_engine::{
    assert_preconditions, current_etag, etag_from_int, ETag, HalState, Link, Relation, RelationItem,
    Relations, Resource, ResourceError, View,
};
use http::header::{CONTENT_TYPE, ETAG, IF_MATCH, IF_NONE_MATCH, LOCATION};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};
use tokio::sync::OnceCell;

pub(crate) const ACCOUNTS: &str = "/accounts";
pub(crate) const ACCOUNT: &str = "/accounts/{account}";

const INVALID_ROLES: &str = "Not all roles are valid HALJSON link objects to an existing role.";

fn role_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\w{1,32}$").expect("valid regex"))
}

fn hal_json_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^application/(?:hal\+)?json(?:$|;)").expect("valid regex"))
}

/// All accounts, optionally only those holding every role in `?roles=a,b`
pub(crate) struct Accounts {
    view: View,
    state: AppState,
    role_ids: Option<Vec<String>>,
}

impl Accounts {
    pub(crate) fn build(state: &AppState, view: View) -> Result<Arc<dyn Resource>, ResourceError> {
        let role_ids = match view.query_value("roles") {
            None => None,
            Some(roles) => {
                let role_ids: Vec<String> = roles.split(',').map(str::to_string).collect();
                if !role_ids.iter().all(|id| role_id_pattern().is_match(id)) {
                    return Err(ResourceError::bad_request(
                        "Syntax error in query parameter 'roles'.",
                    ));
                }
                Some(role_ids)
            }
        };
        Ok(Arc::new(Self {
            view,
            state: state.clone(),
            role_ids,
        }))
    }
}

#[async_trait]
impl Resource for Accounts {
    fn view(&self) -> &View {
        &self.view
    }

    fn link_title(&self) -> Option<String> {
        Some("ADW accounts".to_string())
    }

    async fn link_relations(&self) -> Result<Relations, ResourceError> {
        let state = self.state.clone();
        let embed = self.view.sub_embed("item").map(str::to_string);
        let items = self
            .state
            .store
            .accounts(self.role_ids.clone())
            .map(move |record| -> Result<Arc<dyn Resource>, ResourceError> {
                let view = state.registry.view(
                    ACCOUNT,
                    &[("account", record.account_id.as_str())],
                    embed.as_deref(),
                )?;
                Ok(Arc::new(Account::with_record(view, state.clone(), record)))
            });
        Ok(Relations::new().with("item", Relation::Stream(items.boxed())))
    }
}

/// The roles assigned to a single account
pub(crate) struct Account {
    view: View,
    state: AppState,
    record: OnceCell<Option<AccountRecord>>,
}

impl Account {
    pub(crate) fn new(view: View, state: AppState) -> Self {
        Self {
            view,
            state,
            record: OnceCell::new(),
        }
    }

    /// An account whose record was already read, e.g. while listing
    pub(crate) fn with_record(view: View, state: AppState, record: AccountRecord) -> Self {
        Self {
            view,
            state,
            record: OnceCell::new_with(Some(Some(record))),
        }
    }

    pub(crate) fn build(state: &AppState, view: View) -> Result<Arc<dyn Resource>, ResourceError> {
        Ok(Arc::new(Self::new(view, state.clone())))
    }

    pub(crate) fn id(&self) -> &str {
        self.view.param("account").unwrap_or_default()
    }

    /// The stored record, read at most once; `None` if the account doesn't exist
    pub(crate) async fn record(&self) -> Option<&AccountRecord> {
        self.record
            .get_or_init(|| self.state.store.account(self.id()))
            .await
            .as_ref()
    }
}

#[async_trait]
impl Resource for Account {
    fn view(&self) -> &View {
        &self.view
    }

    fn link_name(&self) -> Option<String> {
        Some(self.id().to_string())
    }

    fn link_title(&self) -> Option<String> {
        Some(format!("ADW account voor <{}>", self.id()))
    }

    async fn etag(&self) -> Result<ETag, ResourceError> {
        Ok(match self.record().await {
            Some(record) => etag_from_int(record.log_id, false),
            None => ETag::NotFound,
        })
    }

    async fn attributes(&self) -> Result<Map<String, Value>, ResourceError> {
        let mut attributes = Map::new();
        if let Some(record) = self.record().await {
            attributes.insert(
                "updated_at".to_string(),
                json!(record.updated_at.to_rfc3339()),
            );
        }
        Ok(attributes)
    }

    async fn link_relations(&self) -> Result<Relations, ResourceError> {
        let Some(record) = self.record().await else {
            return Ok(Relations::new());
        };
        let registry = self.state.registry();
        let embed = self.view.sub_embed("role");
        let mut roles = Vec::with_capacity(record.role_ids.len());
        for role_id in &record.role_ids {
            match registry.build(&self.state, ROLE, &[("role", role_id.as_str())], embed) {
                Ok(role) => roles.push(RelationItem::Resource(role)),
                Err(ResourceError::NotFound(_)) => {
                    // Role was removed from the catalogue after it was assigned.
                    log::warn!("Account {} has unknown role {role_id}", self.id());
                    roles.push(RelationItem::Link(Link::new(
                        registry.url_for(ROLE, &[("role", role_id.as_str())])?,
                    )));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Relations::new().with("role", Relation::Items(roles)))
    }
}

fn account_view(state: &AppState, account_id: &str) -> Result<View, ApiError> {
    Ok(state.registry.view(ACCOUNT, &[("account", account_id)], None)?)
}

fn etag_header(etag: &ETag) -> Result<HeaderValue, ApiError> {
    let tag = etag
        .as_str()
        .ok_or_else(|| ApiError::internal("Account has no entity tag"))?;
    HeaderValue::from_str(tag).map_err(ApiError::internal)
}

/// The role ids a PUT body links to. Every link must point at an existing role.
fn requested_roles(state: &AppState, body: &[u8]) -> Result<Vec<String>, ApiError> {
    let document: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("Request body is not valid JSON: {e}")))?;
    let links = document
        .pointer("/_links/role")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::bad_request("No '#/_links/role' array in request."))?;
    let mut role_ids = BTreeSet::new();
    for link in links {
        let role_id =
            role_from_link(state, link).ok_or_else(|| ApiError::bad_request(INVALID_ROLES))?;
        role_ids.insert(role_id);
    }
    Ok(role_ids.into_iter().collect())
}

fn role_from_link(state: &AppState, link: &Value) -> Option<String> {
    let href = link.get("href")?.as_str()?;
    let role = state.registry.resolve(state, href).ok()?;
    let view = role.view();
    if view.template() != ROLE {
        return None;
    }
    view.param("role").map(str::to_string)
}

/// Create or replace the roles of an account
#[utoipa::path(
    put,
    path = "/accounts/{account}",
    tag = ACCOUNTS_TAG,
    request_body(content = String, content_type = "application/hal+json"),
    params(
        ("account" = String, Path, description = "Account id, usually an e-mail address"),
        ("If-Match" = Option<String>, Header, description = "Entity tag of the account to replace"),
        ("If-None-Match" = Option<String>, Header, description = "`*` to create a new account")
    ),
    responses(
        (status = 201, description = "Account created"),
        (status = 204, description = "Account updated"),
        (status = 400, description = "Malformed body or unknown role"),
        (status = 412, description = "The account isn't in the expected state"),
        (status = 415, description = "Body isn't (HAL+)JSON"),
        (status = 428, description = "Neither If-Match nor If-None-Match given")
    )
)]
pub(crate) async fn put_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    if !headers.contains_key(IF_MATCH) && !headers.contains_key(IF_NONE_MATCH) {
        return Err(ApiError::new(
            "Request requires an If-Match or If-None-Match header.",
            StatusCode::PRECONDITION_REQUIRED,
        ));
    }
    let account = Account::new(account_view(&state, &account_id)?, state.clone());
    let etag = current_etag(&account).await?;
    assert_preconditions(&method, &headers, &etag, false, false)?;

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !hal_json_pattern().is_match(content_type) {
        return Err(ApiError::new(
            format!("Unsupported content type '{content_type}'"),
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ));
    }
    let role_ids = requested_roles(&state, &body)?;

    let response = match account.record().await {
        None => {
            let log_id = state.store.create_account(account.id(), role_ids).await?;
            Response::builder()
                .status(StatusCode::CREATED)
                .header(LOCATION, account.view().path())
                .header(ETAG, etag_header(&etag_from_int(log_id, false))?)
        }
        Some(record) => {
            let log_id = state
                .store
                .update_account(account.id(), record.log_id, role_ids)
                .await?;
            Response::builder()
                .status(StatusCode::NO_CONTENT)
                .header(ETAG, etag_header(&etag_from_int(log_id, false))?)
        }
    };
    response.body(Body::empty()).map_err(ApiError::internal)
}

/// Delete an account
#[utoipa::path(
    delete,
    path = "/accounts/{account}",
    tag = ACCOUNTS_TAG,
    params(
        ("account" = String, Path, description = "Account id, usually an e-mail address"),
        ("If-Match" = String, Header, description = "Entity tag of the account being deleted")
    ),
    responses(
        (status = 204, description = "Account deleted"),
        (status = 404, description = "No such account"),
        (status = 412, description = "The account isn't in the expected state"),
        (status = 428, description = "No If-Match header given")
    )
)]
pub(crate) async fn delete_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let account = Account::new(account_view(&state, &account_id)?, state.clone());
    let record = account
        .record()
        .await
        .ok_or_else(|| ApiError::not_found(format!("Account {account_id} doesn't exist")))?;
    let etag = current_etag(&account).await?;
    assert_preconditions(&method, &headers, &etag, true, false)?;
    state
        .store
        .delete_account(account.id(), record.log_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::test_utils::TestFixture;
    use http::StatusCode;
    use serde_json::json;

    const ADMIN: &str = "/accounts/p.van.beek@amsterdam.nl";

    fn role_body(roles: &[&str]) -> serde_json::Value {
        let links: Vec<_> = roles
            .iter()
            .map(|role| json!({"href": format!("/roles/{role}")}))
            .collect();
        json!({"_links": {"role": links}})
    }

    #[tokio::test]
    async fn test_get_account() {
        let fixture = TestFixture::new().await;
        let response = fixture.get(ADMIN).await;
        response.assert_ok();
        let etag = response.header("etag").expect("account has an etag");
        assert_eq!(response.json["_etag"], json!(etag));
        assert_eq!(
            response.json["_links"]["self"],
            json!({
                "href": ADMIN,
                "name": "p.van.beek@amsterdam.nl",
                "title": "ADW account voor <p.van.beek@amsterdam.nl>"
            })
        );
        let roles = response.json["_links"]["role"].as_array().unwrap();
        assert_eq!(roles.len(), 2);
        assert_eq!(roles[0]["href"], json!("/roles/CDE"));
        assert_eq!(roles[1]["title"], json!("Medewerker plus"));
        assert!(response.json["updated_at"].is_string());
    }

    #[tokio::test]
    async fn test_get_missing_account() {
        let fixture = TestFixture::new().await;
        fixture
            .get("/accounts/nobody@example.com")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_and_filter_accounts() {
        let fixture = TestFixture::new().await;
        fixture
            .put_with_headers(
                "/accounts/e.lammerts@amsterdam.nl",
                &role_body(&["CDE"]),
                &[("If-None-Match", "*")],
            )
            .await
            .assert_status(StatusCode::CREATED);

        let response = fixture.get("/accounts").await;
        response.assert_ok();
        let names: Vec<_> = response.json["_links"]["item"]
            .as_array()
            .unwrap()
            .iter()
            .map(|link| link["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["e.lammerts@amsterdam.nl", "p.van.beek@amsterdam.nl"]
        );

        let response = fixture.get("/accounts?roles=CDE_PLUS&embed=item").await;
        response.assert_ok();
        let items = response.json["_embedded"]["item"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(
            items[0]["_links"]["self"]["name"],
            json!("p.van.beek@amsterdam.nl")
        );
        assert!(items[0]["_etag"].is_string());
    }

    #[tokio::test]
    async fn test_invalid_role_filter() {
        let fixture = TestFixture::new().await;
        let response = fixture.get("/accounts?roles=CDE,not-a-role").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.text(), "Syntax error in query parameter 'roles'.");
    }

    #[tokio::test]
    async fn test_put_requires_a_precondition() {
        let fixture = TestFixture::new().await;
        let response = fixture
            .put_with_headers("/accounts/new@example.com", &role_body(&["CDE"]), &[])
            .await;
        response.assert_status(StatusCode::PRECONDITION_REQUIRED);
    }

    #[tokio::test]
    async fn test_create_then_update_account() {
        let fixture = TestFixture::new().await;
        let uri = "/accounts/new@example.com";
        let created = fixture
            .put_with_headers(uri, &role_body(&["CDE"]), &[("If-None-Match", "*")])
            .await;
        created.assert_status(StatusCode::CREATED);
        assert_eq!(created.header("location").as_deref(), Some(uri));
        let etag = created.header("etag").unwrap();

        // Creating twice fails: the account exists now.
        fixture
            .put_with_headers(uri, &role_body(&["CDE"]), &[("If-None-Match", "*")])
            .await
            .assert_status(StatusCode::PRECONDITION_FAILED);

        let response = fixture.get(uri).await;
        assert_eq!(response.header("etag"), Some(etag.clone()));

        let updated = fixture
            .put_with_headers(
                uri,
                &role_body(&["CDE", "CDE_PLUS"]),
                &[("If-Match", etag.as_str())],
            )
            .await;
        updated.assert_status(StatusCode::NO_CONTENT);
        let new_etag = updated.header("etag").unwrap();
        assert_ne!(new_etag, etag);

        // The old tag is stale.
        fixture
            .put_with_headers(uri, &role_body(&[]), &[("If-Match", etag.as_str())])
            .await
            .assert_status(StatusCode::PRECONDITION_FAILED);

        let response = fixture.get(uri).await;
        assert_eq!(response.json["_links"]["role"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_put_validates_body() {
        let fixture = TestFixture::new().await;
        let uri = "/accounts/new@example.com";
        let headers = [("If-None-Match", "*")];

        let response = fixture
            .put_with_headers(uri, &json!({"_links": {}}), &headers)
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json["detail"],
            json!("No '#/_links/role' array in request.")
        );

        for roles in [
            json!([{"href": "/roles/UNKNOWN"}]),
            json!([{"href": "/profiles/hr_read"}]),
            json!([{"name": "CDE"}]),
            json!(["/roles/CDE"]),
        ] {
            let response = fixture
                .put_with_headers(uri, &json!({"_links": {"role": roles}}), &headers)
                .await;
            response.assert_status(StatusCode::BAD_REQUEST);
            assert_eq!(response.json["detail"], json!(super::INVALID_ROLES));
        }

        // Absolute hrefs are accepted.
        let body = json!({"_links": {"role": [{"href": "http://localhost:8000/roles/CDE"}]}});
        fixture
            .put_with_headers(uri, &body, &headers)
            .await
            .assert_status(StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_put_requires_json() {
        let fixture = TestFixture::new().await;
        let request = fixture
            .request_builder(http::Method::PUT, "/accounts/new@example.com")
            .header("Content-Type", "text/plain")
            .header("If-None-Match", "*")
            .body(axum::body::Body::from("CDE"))
            .unwrap();
        fixture
            .send(request)
            .await
            .assert_status(StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_delete_account() {
        let fixture = TestFixture::new().await;
        fixture
            .delete_with_headers(ADMIN, &[])
            .await
            .assert_status(StatusCode::PRECONDITION_REQUIRED);
        fixture
            .delete_with_headers(ADMIN, &[("If-Match", "\"stale\"")])
            .await
            .assert_status(StatusCode::PRECONDITION_FAILED);

        let etag = fixture.get(ADMIN).await.header("etag").unwrap();
        fixture
            .delete_with_headers(ADMIN, &[("If-Match", etag.as_str())])
            .await
            .assert_status(StatusCode::NO_CONTENT);
        fixture
            .get(ADMIN)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_missing_account() {
        let fixture = TestFixture::new().await;
        let uri = "/accounts/nobody@example.com";
        for headers in [[("If-Match", "\"abc\"")], [("If-Match", "*")]] {
            let response = fixture.delete_with_headers(uri, &headers).await;
            response.assert_status(StatusCode::NOT_FOUND);
        }
        fixture
            .delete_with_headers(uri, &[])
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
