//! The generic GET/HEAD handler.

use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use http::header::{CONTENT_LOCATION, CONTENT_TYPE, ETAG, VARY};
use http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};

use crate::error::ResourceError;
use crate::etag::ETag;
use crate::json::encode;
use crate::negotiation::{best_content_type, content_type_header};
use crate::preconditions::assert_preconditions;
use crate::resource::{Registry, current_etag, to_document};

/// Application state that carries a resource registry.
pub trait HalState: Clone + Send + Sync + 'static {
    fn registry(&self) -> &Registry<Self>;
}

/// Serves any registered resource. Mount it on every resource route:
///
/// ```ignore
/// Router::new().route("/accounts/{account}", get(resource_handler::<AppState>))
/// ```
pub async fn resource_handler<S: HalState>(
    State(state): State<S>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    match serve(&state, &method, &uri, &headers).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn serve<S: HalState>(
    state: &S,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
) -> Result<Response, ResourceError> {
    let media_type = best_content_type(headers)?;
    let registry = state.registry();
    let resource = registry.build_for(state, uri.path(), uri.query())?;
    let view = resource.view();
    view.embed()?;

    let etag = current_etag(resource.as_ref()).await?;
    assert_preconditions(method, headers, &etag, false, false)?;
    if etag == ETag::NotFound {
        return Err(ResourceError::not_found());
    }

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type_header(media_type))
        .header(VARY, "Accept");
    if let ETag::Tag(tag) = &etag {
        response = response.header(ETAG, header_value(tag)?);
    }
    let canonical = view.canonical_url();
    let requested = uri.path_and_query().map_or(uri.path(), |pq| pq.as_str());
    if canonical != requested {
        response = response.header(CONTENT_LOCATION, header_value(&canonical)?);
    }

    if method == Method::HEAD {
        return response
            .body(Body::empty())
            .map_err(ResourceError::internal);
    }
    let document = to_document(resource.as_ref()).await?;
    log::debug!("Streaming {canonical} as {media_type}");
    let body = Body::from_stream(encode(document, registry.encoder_options()));
    response.body(body).map_err(ResourceError::internal)
}

fn header_value(value: &str) -> Result<HeaderValue, ResourceError> {
    HeaderValue::from_str(value).map_err(ResourceError::internal)
}
