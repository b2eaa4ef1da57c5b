use axum::response::{IntoResponse, Response};
use http::StatusCode;
use http::header::CONTENT_TYPE;
use thiserror::Error;

/// Syntax errors in the `embed` query parameter.
///
/// Positions are byte offsets into the (joined) parameter value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmbedError {
    #[error("Syntax error in query parameter 'embed' at position {position}")]
    Syntax { position: usize },

    #[error("Unexpected opening parenthesis in query parameter 'embed' at position {position}")]
    UnexpectedOpening { position: usize },

    #[error("Unmatched closing parenthesis in query parameter 'embed' at position {position}")]
    UnmatchedClosing { position: usize },

    #[error("Unmatched opening parenthesis in query parameter 'embed' at position {position}")]
    UnmatchedOpening { position: usize },

    #[error(
        "Link relation '{relation}' mentioned more than once in query parameter 'embed' at position {position}"
    )]
    DuplicateRelation { relation: String, position: usize },

    #[error("Link relation '{relation}' can not be embedded (position {position})")]
    ReservedRelation { relation: String, position: usize },

    #[error(
        "Maximum query depth {max_depth} exceeded in query parameter 'embed' at position {position}"
    )]
    MaxDepthExceeded { max_depth: usize, position: usize },
}

/// Outcomes of a failed conditional request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("Syntax error in request header {header}: {value}")]
    MalformedHeader { header: &'static str, value: String },

    #[error("Precondition required: {0}")]
    Required(&'static str),

    #[error("Not found")]
    NotFound,

    #[error("Not modified")]
    NotModified,

    #[error("{}", .0.unwrap_or("Precondition failed"))]
    Failed(Option<&'static str>),
}

impl PreconditionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedHeader { .. } => StatusCode::BAD_REQUEST,
            Self::Required(_) => StatusCode::PRECONDITION_REQUIRED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::NotModified => StatusCode::NOT_MODIFIED,
            Self::Failed(_) => StatusCode::PRECONDITION_FAILED,
        }
    }
}

/// None of the offered media types is acceptable to the client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("None of the available content types is acceptable: {}", .available.join(","))]
pub struct NotAcceptable {
    pub available: Vec<&'static str>,
}

/// Fatal errors of the streaming JSON encoder.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Cannot serialize cyclic data structure")]
    Cyclic,

    #[error("Dictionary key is not a string: {0}")]
    NonStringKey(String),

    #[error("Out of range float values are not JSON compliant: {0}")]
    NonFiniteFloat(f64),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("No resource type registered for template '{0}'")]
    UnknownTemplate(String),

    #[error("Missing parameter '{param}' for template '{template}'")]
    MissingParameter { template: String, param: String },

    #[error("Invalid path template '{0}'")]
    InvalidTemplate(String),
}

/// Everything that can stop a resource from being served.
///
/// Each variant maps onto exactly one HTTP status; see [`ResourceError::status_code`].
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error(transparent)]
    NotAcceptable(#[from] NotAcceptable),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("{}", .0.as_deref().unwrap_or("Not found"))]
    NotFound(Option<String>),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl ResourceError {
    pub fn not_found() -> Self {
        Self::NotFound(None)
    }

    pub fn bad_request<S: ToString>(detail: S) -> Self {
        Self::BadRequest(detail.to_string())
    }

    pub fn internal<S: ToString>(detail: S) -> Self {
        Self::Internal(detail.to_string())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Embed(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Precondition(e) => e.status_code(),
            Self::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Registry(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ResourceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Failed to serve resource: {self}");
        } else {
            log::debug!("Client request rejected with {status}: {self}");
        }
        match self {
            Self::Precondition(PreconditionError::NotModified) => status.into_response(),
            Self::NotAcceptable(e) => (
                status,
                [(CONTENT_TYPE, "text/plain; charset=\"US-ASCII\"")],
                e.available.join(","),
            )
                .into_response(),
            other => (
                status,
                [(CONTENT_TYPE, "text/plain; charset=UTF-8")],
                other.to_string(),
            )
                .into_response(),
        }
    }
}
