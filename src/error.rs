//! Error types for the DX provider.

use thiserror::Error;

use crate::allocator::AllocationError;

/// Errors returned by provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested network or resource was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The provider reached a state it should never be in.
    #[error("Internal error: {0}")]
    Internal(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource or data source type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No free address block is left.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The network inventory could not be reached.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Operation failed due to current state (precondition not met).
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// Invalid request from client or malformed data from the inventory.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Get the error message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(msg) => msg,
            Self::Validation(msg) => msg,
            Self::Internal(msg) => msg,
            Self::Configuration(msg) => msg,
            Self::UnknownResource(msg) => msg,
            Self::Serialization(_err) => "serialization error (see Debug output)",
            Self::ResourceExhausted(msg) => msg,
            Self::Unavailable(msg) => msg,
            Self::FailedPrecondition(msg) => msg,
            Self::InvalidRequest(msg) => msg,
        }
    }
}

impl From<AllocationError> for ProviderError {
    fn from(err: AllocationError) -> Self {
        match err {
            AllocationError::NotFound(exhausted) => Self::ResourceExhausted(exhausted.to_string()),
            AllocationError::InvalidUsedRange(_) | AllocationError::NoParseableParent(_) => {
                Self::InvalidRequest(err.to_string())
            },
        }
    }
}

impl From<ProviderError> for tonic::Status {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound(msg) => tonic::Status::not_found(msg),
            ProviderError::Validation(msg) => tonic::Status::invalid_argument(msg),
            ProviderError::Configuration(msg) => tonic::Status::failed_precondition(msg),
            ProviderError::UnknownResource(msg) => tonic::Status::not_found(msg),
            ProviderError::Internal(msg) => tonic::Status::internal(msg),
            ProviderError::Serialization(err) => {
                tonic::Status::invalid_argument(format!("Serialization error: {}", err))
            },
            ProviderError::ResourceExhausted(msg) => tonic::Status::resource_exhausted(msg),
            ProviderError::Unavailable(msg) => tonic::Status::unavailable(msg),
            ProviderError::FailedPrecondition(msg) => tonic::Status::failed_precondition(msg),
            ProviderError::InvalidRequest(msg) => tonic::Status::invalid_argument(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::find_available_block;

    #[test]
    fn test_error_display() {
        let err = ProviderError::NotFound("vpc-123".to_string());
        assert_eq!(format!("{}", err), "Resource not found: vpc-123");

        let err = ProviderError::ResourceExhausted("no free /24 block".to_string());
        assert_eq!(format!("{}", err), "Resource exhausted: no free /24 block");

        let err = ProviderError::UnknownResource("dx_subnet".to_string());
        assert_eq!(format!("{}", err), "Unknown resource type: dx_subnet");
    }

    #[test]
    fn test_error_to_status() {
        let cases = [
            (ProviderError::NotFound("x".into()), tonic::Code::NotFound),
            (ProviderError::Validation("x".into()), tonic::Code::InvalidArgument),
            (ProviderError::Configuration("x".into()), tonic::Code::FailedPrecondition),
            (ProviderError::Internal("x".into()), tonic::Code::Internal),
            (ProviderError::ResourceExhausted("x".into()), tonic::Code::ResourceExhausted),
            (ProviderError::Unavailable("x".into()), tonic::Code::Unavailable),
            (ProviderError::FailedPrecondition("x".into()), tonic::Code::FailedPrecondition),
            (ProviderError::InvalidRequest("x".into()), tonic::Code::InvalidArgument),
        ];

        for (err, code) in cases {
            let status: tonic::Status = err.into();
            assert_eq!(status.code(), code);
        }
    }

    #[test]
    fn test_message_method() {
        let err = ProviderError::NotFound("vpc-123".to_string());
        assert_eq!(err.message(), "vpc-123");

        let err = ProviderError::InvalidRequest("bad request".to_string());
        assert_eq!(err.message(), "bad request");
    }

    #[test]
    fn test_from_allocation_error() {
        let exhausted = find_available_block(&["10.0.0.0/24"], 24, &[] as &[&str]).unwrap_err();
        let err = ProviderError::from(exhausted);
        assert!(matches!(err, ProviderError::ResourceExhausted(_)));
        assert!(err.message().contains("/24"));

        let malformed = find_available_block(&["10.0.0.0/16"], 24, &["garbage"]).unwrap_err();
        let err = ProviderError::from(malformed);
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
        assert!(err.message().contains("garbage"));

        let unparseable = find_available_block(&["10.0.0/16", "nope"], 24, &[] as &[&str])
            .unwrap_err();
        let err = ProviderError::from(unparseable);
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
        assert!(err.message().contains("10.0.0/16, nope"));
    }

    #[test]
    fn test_internal_error_display() {
        let err = ProviderError::Internal("destroy plan kept a state".to_string());
        assert_eq!(err.to_string(), "Internal error: destroy plan kept a state");
        assert_eq!(err.message(), "destroy plan kept a state");

        let status: tonic::Status = err.into();
        assert_eq!(status.code(), tonic::Code::Internal);
        assert_eq!(status.message(), "destroy plan kept a state");
    }
}
