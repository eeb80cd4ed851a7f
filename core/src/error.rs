//! Error types for the provisioning client.
//!
//! # Design
//! Two kinds come out of the adapter itself: `Transport` when no response
//! was obtained and `Api` when the server answered with a status outside the
//! configured success set. Both expose an HTTP status string through
//! `http_status()` ("500" for transport failures), which is what callers
//! branch on. The remaining variants belong to the layers around the
//! adapter: body encoding, response decoding, caller-side validation and
//! configuration loading.

use thiserror::Error;

/// Status reported for failures where no HTTP response was obtained.
pub const TRANSPORT_FAILURE_STATUS: &str = "500";

pub type Result<T> = std::result::Result<T, ProvisioningError>;

/// Errors returned by `ResourceClient` and `Provisioning`.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// The request could not be sent or no response came back.
    #[error("Unable to connect to the Provisioning API server - {message}")]
    Transport { message: String },

    /// The server answered with a non-success status.
    #[error("{status}: {reason} - {body}")]
    Api {
        status: String,
        reason: String,
        body: String,
    },

    /// A success response whose body is not a JSON object or array of objects.
    #[error("unable to decode response body: {0}")]
    Decode(String),

    /// The request body could not be encoded as JSON.
    #[error("unable to encode request body: {0}")]
    Serialize(String),

    /// A required parameter is missing or has an unsupported value.
    #[error("{0}")]
    InvalidArgument(String),

    #[error("address {address} not found with application {application_id}")]
    AddressNotFound {
        application_id: String,
        address: String,
    },

    /// One step of moving an address between applications failed.
    #[error("unable to move address {address}")]
    MoveAddress {
        address: String,
        #[source]
        source: Box<ProvisioningError>,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ProvisioningError {
    pub fn transport(cause: impl std::fmt::Display) -> Self {
        ProvisioningError::Transport {
            message: cause.to_string(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        ProvisioningError::InvalidArgument(message.into())
    }

    /// HTTP status associated with this error, if any.
    pub fn http_status(&self) -> Option<&str> {
        match self {
            ProvisioningError::Transport { .. } => Some(TRANSPORT_FAILURE_STATUS),
            ProvisioningError::Api { status, .. } => Some(status),
            ProvisioningError::MoveAddress { source, .. } => source.http_status(),
            _ => None,
        }
    }
}
