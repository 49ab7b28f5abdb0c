#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Routing(#[from] courier_routing::Error),

    #[error(transparent)]
    Delivery(#[from] courier_delivery::Error),

    #[error("{0}")]
    Message(String),
}

impl Error {
    #[must_use]
    pub fn message(message: impl std::fmt::Display) -> Self {
        Self::Message(message.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
