//! Error types shared by the polling core and the console views.

/// Outcome of a failed fetch. Every variant drives the same backoff path.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("failed to parse response from {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("resource {0} has been destroyed")]
    Destroyed(String),
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            FetchError::Transport { url, .. }
            | FetchError::Status { url, .. }
            | FetchError::Parse { url, .. }
            | FetchError::Timeout { url } => url,
            FetchError::Destroyed(url) => url,
        }
    }
}

/// Programmer errors caught when a view or a fetch task is set up.
#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error("invalid option `{option}`: {reason}")]
    InvalidOption {
        option: &'static str,
        reason: String,
    },

    #[error("missing required option `{0}`")]
    MissingOption(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum RegionError {
    #[error("region `{0}` is no longer attached")]
    Detached(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DetachError {
    #[error("model {0} was dropped before its listener was detached")]
    ModelGone(String),
}
