use std::collections::HashMap;

/// The main error type for storage and infrastructure failures.
///
/// Domain-level failures (validation, invariant violations) live in
/// [`TeamError`](crate::teams::TeamError), which wraps this type.
#[derive(Debug, thiserror::Error)]
pub enum GatehouseError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A uniqueness constraint was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(String),
}

/// Error context for additional error information
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Unique error ID for tracking
    pub error_id: Option<String>,
    /// Additional error details
    pub details: Option<String>,
    /// Contextual key-value pairs
    pub context: HashMap<String, String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_error_id(mut self, id: impl Into<String>) -> Self {
        self.error_id = Some(id.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.details = Some(detail.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error with attached context
///
/// Lets callers attach identifiers (org, team, repo) to a storage error while
/// still converting back into a [`GatehouseError`].
#[derive(Debug)]
pub struct ErrorWithContext {
    error: GatehouseError,
    context: ErrorContext,
}

impl ErrorWithContext {
    pub fn new(error: GatehouseError, context: ErrorContext) -> Self {
        Self { error, context }
    }

    pub fn error(&self) -> &GatehouseError {
        &self.error
    }

    pub fn context(&self) -> &ErrorContext {
        &self.context
    }
}

impl std::fmt::Display for ErrorWithContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)?;
        if let Some(ref details) = self.context.details {
            write!(f, " ({})", details)?;
        }
        for (key, value) in &self.context.context {
            write!(f, " {}={}", key, value)?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorWithContext {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<ErrorWithContext> for GatehouseError {
    fn from(err: ErrorWithContext) -> Self {
        err.error
    }
}

impl GatehouseError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error reports a uniqueness violation.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    pub fn with_context(self, context: ErrorContext) -> ErrorWithContext {
        ErrorWithContext::new(self, context)
    }
}

pub type Result<T> = std::result::Result<T, GatehouseError>;

impl From<serde_json::Error> for GatehouseError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            GatehouseError::BadRequest(format!("JSON error: {}", err))
        } else {
            GatehouseError::Internal(format!("JSON serialization error: {}", err))
        }
    }
}
