use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    /// The database cannot be reached, rejected our credentials, or dropped
    /// the connection. Always fatal for the current run.
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// The object a statement tries to create already exists.
    #[error("already applied: {0}")]
    AlreadyApplied(String),

    #[error("statement error: {0}")]
    Statement(String),

    #[error("invalid migration plan: {0}")]
    Plan(String),
}

impl Error {
    /// Whether the error means the connection is unusable and the run must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Connectivity(_))
    }
}
