//! Adaptor errors.
use displaydoc::Display;
use thiserror::Error;

pub use crate::configuration::ConfigurationError;
use crate::graphql;
pub use crate::invoker::InvokeError;
pub use crate::operation::OperationError;

/// Error types returned by the adaptor.
#[derive(Error, Display, Debug)]
#[non_exhaustive]
pub enum AdaptorError {
    /// invalid configuration: {0}
    Configuration(#[from] ConfigurationError),

    /// could not resolve AWS credentials: {reason}
    Credentials {
        /// The reason the credentials could not be resolved.
        reason: String,
    },

    /// call to function '{function_name}' failed: {source}
    Invocation {
        /// The function that was called.
        function_name: String,
        /// The underlying failure, kept intact.
        source: InvokeError,
    },

    /// function '{function_name}' returned errors: {message}
    GraphQL {
        /// The function that was called.
        function_name: String,
        /// The messages of all errors, joined.
        message: String,
        /// The errors as returned.
        errors: Vec<graphql::Error>,
    },

    /// request was malformed: {reason}
    MalformedRequest {
        /// The reason the serialization failed.
        reason: String,
    },

    /// function '{function_name}' response was malformed: {reason}
    MalformedResponse {
        /// The function that responded with the malformed response.
        function_name: String,
        /// The reason the deserialization failed.
        reason: String,
    },

    /// could not build operation: {0}
    Operation(#[from] OperationError),

    /// unexpected '{operation_name}' result: {reason}
    ResponseShape {
        /// The operation whose result did not match.
        operation_name: String,
        /// What did not match.
        reason: String,
    },
}

impl AdaptorError {
    pub(crate) fn graphql(function_name: &str, errors: Vec<graphql::Error>) -> Self {
        let message = errors
            .iter()
            .map(|error| error.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        AdaptorError::GraphQL {
            function_name: function_name.to_owned(),
            message,
            errors,
        }
    }
}
