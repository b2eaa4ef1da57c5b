use crate::config::Settings;
use crate::create_app;
use crate::state::tests::create_test_state;
use crate::state::AppState;
use axum::body::{Body, Bytes};
use axum::Router;
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use log::LevelFilter;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tower::ServiceExt;

/// Test fixture driving the complete application in-process.
///
/// Every fixture gets its own state, so accounts created by one test are
/// invisible to the others.
///
/// # Examples
///
/// ```rust
/// #[tokio::test]
/// async fn test_endpoint() {
///     let fixture = TestFixture::new().await;
///     let response = fixture.get("/roles/CDE").await;
///     response.assert_ok();
///     assert_eq!(response.json["name"], "Medewerker");
/// }
/// ```
pub struct TestFixture {
    /// The application router
    pub app: Router,
    /// Configuration settings
    pub settings: Settings,
    /// The state behind the router, for inspecting the store
    pub state: AppState,
}

impl TestFixture {
    /// Creates a new test fixture with the test catalogue and a fresh store.
    pub async fn new() -> Self {
        Self::setup_logger(LevelFilter::Debug);
        Self::with_settings(Settings::for_test()).await
    }

    pub async fn with_settings(settings: Settings) -> Self {
        let state = create_test_state(settings.clone());
        let app = create_app(state.clone()).await;
        Self {
            app,
            settings,
            state,
        }
    }

    /// Initializes the test logger with customized settings.
    ///
    /// Called by `TestFixture::new()` with `Debug`; only the first call in a
    /// test binary takes effect.
    pub fn setup_logger(level: LevelFilter) {
        let _ = env_logger::builder()
            .filter_level(level)
            .is_test(true)
            .try_init();
    }

    /// Creates a request builder that asks for HAL+JSON.
    pub fn request_builder(&self, method: Method, uri: impl AsRef<str>) -> http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri.as_ref())
            .header("Accept", "application/hal+json")
    }

    /// Sends a GET request to the specified URI.
    pub async fn get(&self, uri: impl AsRef<str>) -> TestResponse {
        self.get_with_headers(uri, &[]).await
    }

    /// Sends a GET request with extra headers, which replace the defaults.
    pub async fn get_with_headers(
        &self,
        uri: impl AsRef<str>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = self.request_builder(Method::GET, uri);
        if let Some(request_headers) = builder.headers_mut() {
            for (name, value) in headers {
                request_headers.insert(
                    http::HeaderName::from_bytes(name.as_bytes()).expect("Invalid header name"),
                    value.parse().expect("Invalid header value"),
                );
            }
        }
        let request = builder
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(request).await
    }

    /// Sends a PUT request with a JSON body and custom headers.
    pub async fn put_with_headers<T: Serialize>(
        &self,
        uri: impl AsRef<str>,
        body: &T,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let json_body = serde_json::to_vec(body).expect("Failed to serialize body to JSON");
        let mut builder = self
            .request_builder(Method::PUT, uri)
            .header("Content-Type", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder
            .body(Body::from(json_body))
            .expect("Failed to build request");
        self.send(request).await
    }

    /// Sends a DELETE request with custom headers.
    pub async fn delete_with_headers(
        &self,
        uri: impl AsRef<str>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = self.request_builder(Method::DELETE, uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(request).await
    }

    /// Sends a request and returns a TestResponse.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        // Plain-text and empty bodies leave an empty object
        let json = if !body.is_empty() {
            serde_json::from_slice(&body).unwrap_or_else(|_| serde_json::json!({}))
        } else {
            serde_json::json!({})
        };

        TestResponse {
            status,
            headers,
            body,
            json,
        }
    }
}

/// Response from a test request that provides convenient access to status, headers and body.
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Raw response body
    pub body: Bytes,
    /// Response body as JSON (if present and valid JSON)
    pub json: Value,
}

impl TestResponse {
    /// Checks if the response status is successful (2xx).
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Asserts that the response has the expected status code.
    ///
    /// # Panics
    ///
    /// Panics if the status code doesn't match the expected value.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {} but got {} with body: {}",
            expected,
            self.status,
            self.text()
        );
        self
    }

    /// Asserts that the response status is OK (200).
    pub fn assert_ok(&self) -> &Self {
        self.assert_status(StatusCode::OK)
    }

    /// The value of response header `name`, if present and valid text.
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }

    /// The response body as text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Converts the response body to the specified type.
    ///
    /// # Panics
    ///
    /// Panics if deserialization fails.
    pub fn json_as<T: DeserializeOwned>(&self) -> T {
        serde_json::from_value(self.json.clone()).expect("Failed to deserialize response JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Deserialize)]
    struct Described {
        name: String,
        description: Option<String>,
    }

    #[tokio::test]
    async fn test_fixtures_are_isolated() {
        let first = TestFixture::new().await;
        let second = TestFixture::new().await;
        let admin = "/accounts/p.van.beek@amsterdam.nl";
        first
            .delete_with_headers(admin, &[("If-Match", "*")])
            .await
            .assert_status(StatusCode::NO_CONTENT);
        assert!(second
            .state
            .store
            .account("p.van.beek@amsterdam.nl")
            .await
            .is_some());
        assert_eq!(second.settings.port, 0);
        assert!(second.get(admin).await.is_success());
        assert!(!first.get(admin).await.is_success());
    }

    #[tokio::test]
    async fn test_json_as() {
        let fixture = TestFixture::new().await;
        let role: Described = fixture.get("/roles/CDE").await.json_as();
        assert_eq!(role.name, "Medewerker");
        assert_eq!(role.description.as_deref(), Some("Employee of the city"));
    }
}
