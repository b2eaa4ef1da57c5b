use utoipa::OpenApi;

pub(crate) const HEALTH_TAG: &str = "Health API";
pub(crate) const ACCOUNTS_TAG: &str = "Accounts API";

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::health::health_check,
        crate::api::health::ready_check,
        crate::api::accounts::put_account,
        crate::api::accounts::delete_account,
    ),
    tags(
        (name = HEALTH_TAG, description = "Health check endpoints"),
        (name = ACCOUNTS_TAG, description = "Account role assignment endpoints"),
    ),
    info(
        title = "Authorization Administration API",
        description = "HAL+JSON administration of accounts, roles, profiles and datasets",
        version = "0.1.0"
    )
)]
pub(crate) struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestFixture;

    #[test]
    fn test_documented_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/health"));
        assert!(doc.paths.paths.contains_key("/ready"));
        assert!(doc.paths.paths.contains_key("/accounts/{account}"));
    }

    #[test]
    fn test_put_account_documents_hal_body() {
        let doc = ApiDoc::openapi();
        let account = &doc.paths.paths["/accounts/{account}"];
        let body = account
            .put
            .as_ref()
            .and_then(|operation| operation.request_body.as_ref())
            .expect("PUT has a request body");
        assert!(body.content.contains_key("application/hal+json"));
        assert!(account.delete.as_ref().unwrap().request_body.is_none());
    }

    #[tokio::test]
    async fn test_scalar_is_served() {
        let fixture = TestFixture::new().await;
        let response = fixture.get("/scalar").await;
        response.assert_ok();
        assert!(response.text().contains("Authorization Administration API"));
    }
}
