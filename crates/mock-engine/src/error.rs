//! Engine Error Types

use std::time::Duration;
use storage::{HttpMethod, StorageError};
use thiserror::Error;

/// Errors while parsing a response template
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// Template is not valid JSON or has conflicting keys
    #[error("template is malformed: {0}")]
    Malformed(String),

    /// Repeat marker asks for too many items
    #[error("repeat count {count} exceeds maximum of {max}")]
    RepeatTooLarge { count: u64, max: usize },

    /// Nested repeat markers would produce too large a document
    #[error("template expands to more than {max} values")]
    ExpansionTooLarge { max: usize },
}

/// Errors returned by a render call.
///
/// Display strings are what clients see, so they never mention the
/// definition's contents.
#[derive(Debug, Error)]
pub enum MockError {
    #[error("mock endpoint not found")]
    DefinitionNotFound,

    #[error("method not allowed")]
    MethodNotAllowed { allowed: HttpMethod },

    #[error("unauthorized")]
    Unauthorized,

    #[error("rate limit exceeded")]
    RateLimited { limit: u32, retry_after: Duration },

    #[error("mock endpoint template is invalid")]
    TemplateMalformed(#[source] TemplateError),

    #[error("storage unavailable")]
    Storage(#[from] StorageError),
}
