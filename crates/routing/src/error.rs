use crate::tier::Toggle;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("the {0} toggle is protected and can only be changed through its own operation")]
    ProtectedToggle(Toggle),

    #[error("unknown tier: {0}")]
    UnknownTier(String),

    #[error("unknown toggle: {0}")]
    UnknownToggle(String),
}

pub type Result<T> = std::result::Result<T, Error>;
