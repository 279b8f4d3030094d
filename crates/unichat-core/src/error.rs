/// Failures a chat turn can end with.
///
/// Connection failures are kept apart from everything else so the UI can
/// tell the user to start the backend instead of showing a raw error.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Ollama is not running at {endpoint}.\nStart it using: {}", start_command(.model))]
    BackendUnavailable {
        endpoint: String,
        model: Option<String>,
    },

    #[error("Error: {0}")]
    RequestFailed(String),
}

impl ChatError {
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, ChatError::BackendUnavailable { .. })
    }

    /// Classify a transport error from reqwest.
    ///
    /// Timeouts are checked first: a request that connected and then stalled
    /// is a failed request, not a missing backend.
    pub(crate) fn from_transport(err: reqwest::Error, endpoint: &str, model: Option<&str>) -> Self {
        if err.is_timeout() {
            ChatError::RequestFailed(format!("request timed out: {}", err))
        } else if err.is_connect() {
            ChatError::BackendUnavailable {
                endpoint: endpoint.to_string(),
                model: model.map(str::to_string),
            }
        } else {
            ChatError::RequestFailed(err.to_string())
        }
    }
}

fn start_command(model: &Option<String>) -> String {
    match model {
        Some(model) => format!("ollama run {}", model),
        None => "ollama serve".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
