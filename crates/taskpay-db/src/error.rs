use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Invalid {column} value in row: {value}")]
    InvalidColumn { column: &'static str, value: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for taskpay_core::Error {
    fn from(err: Error) -> Self {
        taskpay_core::Error::Storage(err.to_string())
    }
}
