use thiserror::Error;

/// Errors surfaced by the API adapters and the stores
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network failure or timeout before a response arrived
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a non-success status
    #[error("{message} (status {status})")]
    Remote { status: u16, message: String },

    /// The response body could not be decoded
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// A success envelope carried no `data` where one was required
    #[error("response from {0} carried no data")]
    MissingData(String),

    /// Rejected locally, no request was sent
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Remote { status, .. } => Some(*status),
            ClientError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(403)
    }

    pub fn is_server_fault(&self) -> bool {
        matches!(self.status(), Some(s) if s >= 500)
    }

    /// Short message suitable for showing to a person
    pub fn user_message(&self) -> String {
        if self.is_not_found() {
            "The requested resource does not exist".to_string()
        } else if self.is_forbidden() {
            "You do not have permission to perform this action".to_string()
        } else if self.is_server_fault() {
            "Server error, please try again later".to_string()
        } else {
            match self {
                ClientError::Remote { message, .. } => message.clone(),
                other => other.to_string(),
            }
        }
    }
}
