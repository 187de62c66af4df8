//! Calls to remote functions.

mod lambda;

use async_trait::async_trait;
use displaydoc::Display;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub use self::lambda::LambdaInvoker;
use crate::graphql::Request;

/// Error types for remote function calls.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
#[ignore_extra_doc_attributes]
#[non_exhaustive]
pub enum InvokeError {
    /// could not reach the function service: {reason}
    ///
    /// note that this relates to a transport error and not a function error
    Transport {
        /// The reason the call failed.
        reason: String,
    },

    /// function service rejected the call with status {status}: {message}
    Rejected {
        /// The HTTP status of the rejection.
        status: u16,
        /// The message the service returned.
        message: String,
    },

    /// function failed with {kind}: {payload}
    FunctionError {
        /// The kind of failure the service reported, e.g. `Unhandled`.
        kind: String,
        /// The error payload the function returned.
        payload: String,
    },

    /// could not sign the call: {reason}
    Signing {
        /// The reason signing failed.
        reason: String,
    },

    /// function returned an invalid payload: {reason}
    Payload {
        /// The reason the payload could not be decoded.
        reason: String,
    },
}

/// Sends payloads to named remote functions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteInvoker: Send + Sync {
    /// Invoke `function_name` with `payload` and wait for its response.
    async fn invoke(&self, function_name: &str, payload: Value) -> Result<Value, InvokeError>;
}

/// The payload GraphQL functions are invoked with.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct InvocationPayload<'a> {
    /// Identifies the remote GraphQL endpoint the function forwards to.
    pub(crate) endpoint_id: &'a str,
    pub(crate) params: &'a Request,
}
