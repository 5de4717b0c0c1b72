use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    #[error("token lookup collision")]
    TokenLookupCollision,

    #[error("invalid configuration: {0}")]
    Config(String),

    /// Credential or session rejection reported by the identity provider.
    /// The message is shown to the user as-is.
    #[error("{0}")]
    Auth(String),

    #[error("provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("invalid session: {0}")]
    InvalidSession(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid token format")]
    InvalidTokenFormat,
}

pub type Result<T> = std::result::Result<T, Error>;
