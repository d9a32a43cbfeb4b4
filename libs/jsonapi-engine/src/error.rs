//! Central error taxonomy and its mapping to JSON:API error documents.
//!
//! Every failure the engine can produce is one variant here, with a stable
//! kebab-case `code` and a fixed HTTP status. Parsing paths aggregate many
//! errors into one [`Rejection`]; dispatch paths short-circuit on the first.

use http::{Method, StatusCode};
use jsonapi_core::{Document, ErrorObject, ErrorSource};

use crate::interfaces::{PersistError, RepositoryError, Violation};
use crate::registry::ResourceMetadata;

/// One protocol error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("'{path}' is not a valid include path: {detail}")]
    InvalidIncludePath {
        path: String,
        detail: String,
        parameter: String,
    },

    #[error("include tree exceeds the maximum depth of {max}")]
    IncludeTooDeep { max: usize, parameter: String },

    #[error("invalid fieldset: {detail}")]
    InvalidFieldset { detail: String, parameter: String },

    #[error("invalid sort field: {detail}")]
    InvalidSortField { detail: String, parameter: String },

    #[error("invalid filter: {detail}")]
    InvalidFilter { detail: String, parameter: String },

    #[error("invalid pagination: {detail}")]
    InvalidPagination { detail: String, parameter: String },

    #[error("local id '{lid}' is not declared in this request")]
    UnknownLid { lid: String, pointer: String },

    #[error("local id '{lid}' is declared more than once")]
    DuplicateLid { lid: String, pointer: String },

    #[error("unknown operation: {detail}")]
    UnknownOperation { detail: String, pointer: String },

    #[error("operation count exceeds the maximum of {max}")]
    TooManyOperations { max: usize },

    #[error("unknown attribute '{name}'")]
    UnknownAttribute { name: String, pointer: String },

    #[error("unknown relationship '{name}'")]
    UnknownRelationship { name: String, pointer: String },

    #[error("invalid relationship data: {detail}")]
    InvalidRelationshipData { detail: String, pointer: String },

    #[error("invalid document: {detail}")]
    InvalidDocument { detail: String, pointer: String },

    #[error("profile '{uri}' is not supported")]
    UnsupportedProfile { uri: String },

    #[error("client-generated ids are not allowed for this type")]
    ForbiddenClientId { pointer: String },

    #[error("{detail}")]
    NotFound {
        detail: String,
        pointer: Option<String>,
    },

    #[error("method not allowed")]
    MethodNotAllowed { allow: Vec<Method> },

    #[error("not acceptable: {detail}")]
    NotAcceptable { detail: String },

    #[error("conflict: {detail}")]
    Conflict {
        detail: String,
        pointer: Option<String>,
    },

    #[error("precondition failed")]
    PreconditionFailed { header: String },

    #[error("unsupported media type: {detail}")]
    UnsupportedMediaType { detail: String },

    #[error("validation failed")]
    Validation { violations: Vec<MappedViolation> },

    #[error("precondition required")]
    PreconditionRequired { header: String },

    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

/// A validation violation with its JSON Pointer already computed.
#[derive(Debug, Clone)]
pub struct MappedViolation {
    pub pointer: String,
    pub message: String,
}

impl Error {
    pub fn unknown_type(type_name: &str) -> Self {
        Error::NotFound {
            detail: format!("'{type_name}' is not a known resource type"),
            pointer: None,
        }
    }

    pub fn resource_not_found(type_name: &str, id: &str) -> Self {
        Error::NotFound {
            detail: format!("resource '{type_name}:{id}' does not exist"),
            pointer: None,
        }
    }

    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Error::Internal(err.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::InvalidIncludePath { .. }
            | Error::IncludeTooDeep { .. }
            | Error::InvalidFieldset { .. }
            | Error::InvalidSortField { .. }
            | Error::InvalidFilter { .. }
            | Error::InvalidPagination { .. }
            | Error::UnknownLid { .. }
            | Error::DuplicateLid { .. }
            | Error::UnknownOperation { .. }
            | Error::TooManyOperations { .. }
            | Error::UnknownAttribute { .. }
            | Error::UnknownRelationship { .. }
            | Error::InvalidRelationshipData { .. }
            | Error::InvalidDocument { .. }
            | Error::UnsupportedProfile { .. } => StatusCode::BAD_REQUEST,
            Error::ForbiddenClientId { .. } => StatusCode::FORBIDDEN,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Error::NotAcceptable { .. } => StatusCode::NOT_ACCEPTABLE,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            Error::PreconditionFailed { .. } => StatusCode::PRECONDITION_FAILED,
            Error::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Error::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::PreconditionRequired { .. } => StatusCode::PRECONDITION_REQUIRED,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidIncludePath { .. } => "invalid-include-path",
            Error::IncludeTooDeep { .. } => "include-too-deep",
            Error::InvalidFieldset { .. } => "invalid-fieldset",
            Error::InvalidSortField { .. } => "invalid-sort-field",
            Error::InvalidFilter { .. } => "invalid-filter",
            Error::InvalidPagination { .. } => "invalid-pagination",
            Error::UnknownLid { .. } => "unknown-lid",
            Error::DuplicateLid { .. } => "duplicate-lid",
            Error::UnknownOperation { .. } => "unknown-operation",
            Error::TooManyOperations { .. } => "too-many-operations",
            Error::UnknownAttribute { .. } => "unknown-attribute",
            Error::UnknownRelationship { .. } => "unknown-relationship",
            Error::InvalidRelationshipData { .. } => "invalid-relationship-data",
            Error::InvalidDocument { .. } => "invalid-document",
            Error::UnsupportedProfile { .. } => "unsupported-profile",
            Error::ForbiddenClientId { .. } => "forbidden-client-generated-id",
            Error::NotFound { .. } => "not-found",
            Error::MethodNotAllowed { .. } => "method-not-allowed",
            Error::NotAcceptable { .. } => "not-acceptable",
            Error::Conflict { .. } => "conflict",
            Error::PreconditionFailed { .. } => "precondition-failed",
            Error::UnsupportedMediaType { .. } => "unsupported-media-type",
            Error::Validation { .. } => "unprocessable-entity",
            Error::PreconditionRequired { .. } => "precondition-required",
            Error::Internal(_) => "internal",
        }
    }

    pub fn title(&self) -> &'static str {
        match self.status() {
            StatusCode::BAD_REQUEST => "Bad Request",
            StatusCode::FORBIDDEN => "Forbidden",
            StatusCode::NOT_FOUND => "Not Found",
            StatusCode::METHOD_NOT_ALLOWED => "Method Not Allowed",
            StatusCode::NOT_ACCEPTABLE => "Not Acceptable",
            StatusCode::CONFLICT => "Conflict",
            StatusCode::PRECONDITION_FAILED => "Precondition Failed",
            StatusCode::UNSUPPORTED_MEDIA_TYPE => "Unsupported Media Type",
            StatusCode::UNPROCESSABLE_ENTITY => "Unprocessable Entity",
            StatusCode::PRECONDITION_REQUIRED => "Precondition Required",
            _ => "Internal Server Error",
        }
    }

    /// The `Allow` header value for 405 responses.
    pub fn allow_header(&self) -> Option<String> {
        match self {
            Error::MethodNotAllowed { allow } => Some(
                allow
                    .iter()
                    .map(|m| m.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            _ => None,
        }
    }

    fn source_member(&self) -> Option<ErrorSource> {
        match self {
            Error::InvalidIncludePath { parameter, .. }
            | Error::IncludeTooDeep { parameter, .. }
            | Error::InvalidFieldset { parameter, .. }
            | Error::InvalidSortField { parameter, .. }
            | Error::InvalidFilter { parameter, .. }
            | Error::InvalidPagination { parameter, .. } => {
                Some(ErrorSource::parameter(parameter.clone()))
            }
            Error::UnknownLid { pointer, .. }
            | Error::DuplicateLid { pointer, .. }
            | Error::UnknownOperation { pointer, .. }
            | Error::UnknownAttribute { pointer, .. }
            | Error::UnknownRelationship { pointer, .. }
            | Error::InvalidRelationshipData { pointer, .. }
            | Error::InvalidDocument { pointer, .. }
            | Error::ForbiddenClientId { pointer } => Some(ErrorSource::pointer(pointer.clone())),
            Error::NotFound { pointer, .. } | Error::Conflict { pointer, .. } => {
                pointer.as_ref().map(|p| ErrorSource::pointer(p.clone()))
            }
            Error::PreconditionFailed { header } | Error::PreconditionRequired { header } => {
                Some(ErrorSource::header(header.clone()))
            }
            _ => None,
        }
    }

    /// Renders this error as JSON:API error objects. `Validation` fans out
    /// into one object per violation; everything else maps one-to-one.
    pub fn to_error_objects(&self) -> Vec<ErrorObject> {
        if let Error::Validation { violations } = self {
            return violations
                .iter()
                .map(|v| {
                    ErrorObject::new(self.status().as_u16(), self.code(), self.title())
                        .with_detail(v.message.clone())
                        .with_source(ErrorSource::pointer(v.pointer.clone()))
                })
                .collect();
        }

        let detail = match self {
            // Collaborator internals never reach the wire.
            Error::Internal(_) => "an internal error occurred".to_string(),
            other => other.to_string(),
        };
        let mut obj = ErrorObject::new(self.status().as_u16(), self.code(), self.title())
            .with_detail(detail);
        if let Some(source) = self.source_member() {
            obj = obj.with_source(source);
        }
        vec![obj]
    }
}

impl From<RepositoryError> for Error {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Error::NotFound {
                detail: "resource does not exist".to_string(),
                pointer: None,
            },
            RepositoryError::Backend(inner) => Error::Internal(inner),
        }
    }
}

/// Maps a persister failure for `meta` onto the taxonomy, computing JSON
/// Pointers for validation violations from the submitted document shape.
pub fn map_persist_error(meta: &ResourceMetadata, id: Option<&str>, err: PersistError) -> Error {
    match err {
        PersistError::NotFound => match id {
            Some(id) => Error::resource_not_found(&meta.type_name, id),
            None => Error::NotFound {
                detail: format!("'{}' target does not exist", meta.type_name),
                pointer: None,
            },
        },
        PersistError::Conflict(detail) => Error::Conflict {
            detail,
            pointer: None,
        },
        PersistError::Validation(violations) => Error::Validation {
            violations: violations
                .iter()
                .map(|v| map_violation(meta, v))
                .collect(),
        },
        PersistError::Backend(inner) => Error::Internal(inner),
    }
}

/// Computes the JSON Pointer for one violation relative to the submitted
/// document: attributes land at `/data/attributes/NAME`, relationships at
/// `/data/relationships/NAME/data`, anything else at `/data`.
pub fn map_violation(meta: &ResourceMetadata, violation: &Violation) -> MappedViolation {
    let head = violation
        .path
        .split('.')
        .next()
        .unwrap_or(violation.path.as_str());
    let pointer = if meta.attribute(head).is_some() {
        format!("/data/attributes/{head}")
    } else if meta.relationship(head).is_some() {
        format!("/data/relationships/{head}/data")
    } else {
        "/data".to_string()
    };
    MappedViolation {
        pointer,
        message: violation.message.clone(),
    }
}

/// One or more errors bound for a single error document.
#[derive(Debug)]
pub struct Rejection {
    pub errors: Vec<Error>,
}

impl Rejection {
    pub fn new(errors: Vec<Error>) -> Self {
        debug_assert!(!errors.is_empty());
        Self { errors }
    }

    /// The response status: the single error's status, or 400 when errors
    /// of mixed status are aggregated.
    pub fn status(&self) -> StatusCode {
        let first = self
            .errors
            .first()
            .map(Error::status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if self.errors.iter().all(|e| e.status() == first) {
            first
        } else {
            StatusCode::BAD_REQUEST
        }
    }

    pub fn allow_header(&self) -> Option<String> {
        self.errors.iter().find_map(Error::allow_header)
    }

    pub fn into_document(self) -> Document {
        let objects = self
            .errors
            .iter()
            .flat_map(Error::to_error_objects)
            .collect();
        Document::from_errors(objects)
    }
}

impl From<Error> for Rejection {
    fn from(err: Error) -> Self {
        Rejection::new(vec![err])
    }
}

impl From<Vec<Error>> for Rejection {
    fn from(errors: Vec<Error>) -> Self {
        Rejection::new(errors)
    }
}
