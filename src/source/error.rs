use reqwest::StatusCode;
use thiserror::Error;

/// Faults raised while talking to the market-data provider.
///
/// These never leave the fetch layer: `DataFetcher` turns every one of them
/// into an empty result.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} from {url}")]
    Status { status: StatusCode, url: String },

    #[error("could not decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("no data found for `{0}`")]
    NotFound(String),

    #[error("provider error: {0}")]
    Provider(String),
}

impl SourceError {
    /// Worth another attempt: transport faults, rate limiting and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            _ => false,
        }
    }
}
