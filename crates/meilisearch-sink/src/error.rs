use thiserror::Error;

#[derive(Error, Debug)]
pub enum MeiliError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Meilisearch returned {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Document has no primary key field '{0}'")]
    MissingPrimaryKey(String),
}

impl MeiliError {
    /// Server-side or transport failures that may succeed when retried.
    pub fn is_retriable(&self) -> bool {
        match self {
            MeiliError::Http(e) => e.is_timeout() || e.is_connect(),
            MeiliError::Api { status, .. } => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            MeiliError::MissingPrimaryKey(_) => false,
        }
    }
}
