use courier_routing::Tier;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No workflow endpoint configured for the tier.
    #[error("no endpoint configured for tier {0}")]
    MissingEndpoint(Tier),

    #[error("invalid endpoint for {key}: {message}")]
    InvalidEndpoint { key: String, message: String },

    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("fallback database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("corrupt fallback record: {0}")]
    Corrupt(String),
}

impl Error {
    #[must_use]
    pub fn invalid_endpoint(key: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::InvalidEndpoint {
            key: key.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
