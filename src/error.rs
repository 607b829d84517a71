//! Error types shared by the capture, transport and alert components.

/// Failure of a single round trip to the detection backend.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("{endpoint} answered HTTP {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("malformed response from {endpoint}: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl TransportError {
    /// HTTP status code, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            TransportError::Request { source, .. } => source.status().map(|s| s.as_u16()),
            TransportError::Decode { .. } => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("audio unavailable: {0}")]
    AudioUnavailable(String),

    #[error("image encoding error: {0}")]
    Encode(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, Error>;
