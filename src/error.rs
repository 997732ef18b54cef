// Error taxonomy for the branch registry and its collaborators
//
// RegistryError is what callers (CLI, API, UI) see.
// GatewayError and StorageError are what the collaborators report.

// ============================================================================
// REGISTRY ERRORS
// ============================================================================

/// Errors returned by [`crate::BranchRegistry`] operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    /// Required field missing or blank (detected before any network call)
    #[error("{field} is required")]
    Validation { field: String },

    /// Store reported a uniqueness violation (duplicate name or code)
    #[error("branch already exists: {0}")]
    Conflict(String),

    /// Referenced id is not in the loaded branch list
    #[error("branch not found: {0}")]
    NotFound(String),

    /// Any other store failure, carrying the store's message
    #[error("could not save branch: {0}")]
    Persistence(String),
}

impl RegistryError {
    pub fn validation(field: impl Into<String>) -> Self {
        RegistryError::Validation {
            field: field.into(),
        }
    }

    /// True when the error was detected locally, without a gateway round-trip
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            RegistryError::Validation { .. } | RegistryError::NotFound(_)
        )
    }
}

impl From<GatewayError> for RegistryError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::UniqueViolation(message) => RegistryError::Conflict(message),
            GatewayError::NotNullViolation { column } => RegistryError::Validation { field: column },
            other => RegistryError::Persistence(other.to_string()),
        }
    }
}

// ============================================================================
// GATEWAY ERRORS
// ============================================================================

/// Failures reported by a [`crate::gateway::RemoteTableGateway`]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("not-null constraint violated: {column}")]
    NotNullViolation { column: String },

    #[error("no row with id {0}")]
    RowNotFound(String),

    #[error("{0}")]
    Failure(String),
}

impl From<rusqlite::Error> for GatewayError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ffi;

        match &err {
            rusqlite::Error::SqliteFailure(code, message) => {
                let message = message.clone().unwrap_or_else(|| err.to_string());
                match code.extended_code {
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                        GatewayError::UniqueViolation(message)
                    }
                    ffi::SQLITE_CONSTRAINT_NOTNULL => GatewayError::NotNullViolation {
                        column: not_null_column(&message),
                    },
                    _ => GatewayError::Failure(message),
                }
            }
            _ => GatewayError::Failure(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Failure(err.to_string())
    }
}

/// "NOT NULL constraint failed: branches.name" -> "name"
fn not_null_column(message: &str) -> String {
    message
        .rsplit(|c: char| c == '.' || c == ' ')
        .next()
        .unwrap_or(message)
        .to_string()
}

// ============================================================================
// STORAGE ERRORS
// ============================================================================

/// Failures writing the durable selection store
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}
