use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{provider} API error ({status}): {body}")]
    ApiError {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),

    #[error("Unsupported payout destination for {0}")]
    UnsupportedDestination(&'static str),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] taskpay_core::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for taskpay_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::ApiError {
                provider,
                status,
                body,
            } => taskpay_core::Error::ProviderApi {
                provider: provider.to_string(),
                status,
                body,
            },
            Error::InvalidSignature => taskpay_core::Error::InvalidSignature,
            Error::MalformedPayload(msg) => taskpay_core::Error::MalformedPayload(msg),
            Error::UnsupportedDestination(provider) => taskpay_core::Error::Validation(format!(
                "Unsupported payout destination for {}",
                provider
            )),
            Error::Core(inner) => inner,
            other => taskpay_core::Error::Provider(other.to_string()),
        }
    }
}

/// Turn a non-2xx vendor response into [`Error::ApiError`], keeping the body verbatim.
pub(crate) async fn ensure_success(
    provider: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    tracing::error!("{} API returned {}: {}", provider, status, body);

    Err(Error::ApiError {
        provider,
        status,
        body,
    })
}
