/// Errors produced by the deployment workflow and the service wrappers
///
/// `NotFound` and `NotActive` are branch conditions consumed internally,
/// the rest bubble up to the command entry point unmodified.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A role or function with the given name does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// The execution role exists but has not propagated far enough
    /// to be assumed by the Lambda service yet
    #[error("role is not assumable yet: {message}")]
    RoleNotAssumable { message: String },

    /// The function has not reached the Active state yet
    #[error("function {name} is not active yet (state: {state})")]
    NotActive { name: String, state: String },

    #[error("function {name} did not become active within {seconds} seconds")]
    ActivationTimeout { name: String, seconds: u64 },

    /// Terminal failure reported by the provider, never retried
    #[error("function {name} entered Failed state: {reason}")]
    ActivationFailed { name: String, reason: String },

    #[error("{0}")]
    InvalidInput(String),

    #[error("failed to install dependencies: {0}")]
    Dependencies(String),

    /// Any other provider error, re-raised with its original code and message
    #[error("{code}: {message}")]
    Provider { code: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Archive(#[from] zip::result::ZipError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// True for the identity-propagation lag condition which function
    /// creation retries against
    pub fn is_role_not_assumable(&self) -> bool {
        matches!(self, Error::RoleNotAssumable { .. })
    }
}
