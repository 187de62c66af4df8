//! Executes GraphQL operations on remote functions.

use std::sync::Arc;

use serde_json::Value;

use crate::error::AdaptorError;
use crate::graphql;
use crate::graphql::Object;
use crate::graphql::OperationType;
use crate::graphql::Request;
use crate::introspection::INTROSPECTION_QUERY;
use crate::introspection::Schema;
use crate::invoker::InvocationPayload;
use crate::invoker::RemoteInvoker;
use crate::operation::build_operation;
use crate::schema_cache::SchemaCache;

const INTROSPECTION_OPERATION_NAME: &str = "IntrospectionQuery";

/// Runs operations against the functions behind one endpoint.
///
/// Every query goes through [`QueryExecutor::execute`]: the schema of the
/// function is looked up (and fetched on first use), an operation is built for
/// the requested root field and dispatched with the caller's variables.
pub struct QueryExecutor {
    endpoint_id: String,
    invoker: Arc<dyn RemoteInvoker>,
    schemas: SchemaCache,
}

impl QueryExecutor {
    pub fn new(endpoint_id: impl Into<String>, invoker: Arc<dyn RemoteInvoker>) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            invoker,
            schemas: SchemaCache::new(),
        }
    }

    pub fn endpoint_id(&self) -> &str {
        &self.endpoint_id
    }

    pub fn schemas(&self) -> &SchemaCache {
        &self.schemas
    }

    /// The schema of `function_name`, introspected on the first call only.
    pub async fn fetch_schema(&self, function_name: &str) -> Result<Arc<Schema>, AdaptorError> {
        self.schemas
            .get_or_fetch(function_name, || self.introspect(function_name))
            .await
    }

    async fn introspect(&self, function_name: &str) -> Result<Schema, AdaptorError> {
        let request =
            Request::new(INTROSPECTION_QUERY).with_operation_name(INTROSPECTION_OPERATION_NAME);
        let data = self.dispatch(function_name, &request).await?;
        Schema::from_data(data).map_err(|err| {
            tracing::error!(function_name, error = %err, "invalid introspection result");
            AdaptorError::MalformedResponse {
                function_name: function_name.to_owned(),
                reason: format!("invalid introspection result: {err}"),
            }
        })
    }

    /// Run the root field `operation_name` of `function_name` and return the
    /// `data` of the response as is.
    pub async fn execute(
        &self,
        function_name: &str,
        operation_name: &str,
        operation_type: OperationType,
        variables: Object,
    ) -> Result<Object, AdaptorError> {
        let schema = self.fetch_schema(function_name).await?;
        let operation =
            build_operation(operation_name, operation_type, &schema).map_err(|err| {
                tracing::error!(function_name, operation_name, error = %err, "could not build operation");
                err
            })?;

        let request = Request::new(operation.query)
            .with_operation_name(operation.name)
            .with_variables(variables);
        match self.dispatch(function_name, &request).await? {
            Value::Object(data) => Ok(data),
            other => {
                tracing::error!(function_name, operation_name, data = %other, "data is not an object");
                Err(AdaptorError::MalformedResponse {
                    function_name: function_name.to_owned(),
                    reason: "data is not an object".to_owned(),
                })
            }
        }
    }

    /// Send `request` to `function_name` and return the `data` of its response.
    async fn dispatch(&self, function_name: &str, request: &Request) -> Result<Value, AdaptorError> {
        let payload = serde_json::to_value(InvocationPayload {
            endpoint_id: &self.endpoint_id,
            params: request,
        })
        .map_err(|err| {
            tracing::error!(function_name, error = %err, "could not serialize request");
            AdaptorError::MalformedRequest {
                reason: err.to_string(),
            }
        })?;

        tracing::debug!(
            function_name,
            operation_name = request.operation_name.as_deref(),
            "dispatching operation"
        );
        let payload = self
            .invoker
            .invoke(function_name, payload)
            .await
            .map_err(|source| {
                tracing::error!(function_name, error = %source, "function call failed");
                AdaptorError::Invocation {
                    function_name: function_name.to_owned(),
                    source,
                }
            })?;

        let response = graphql::Response::from_invocation(payload).map_err(|err| {
            tracing::error!(function_name, error = %err, "response is not a GraphQL response");
            AdaptorError::MalformedResponse {
                function_name: function_name.to_owned(),
                reason: err.to_string(),
            }
        })?;
        if !response.errors.is_empty() {
            let error = AdaptorError::graphql(function_name, response.errors);
            tracing::error!(function_name, error = %error, "operation failed");
            return Err(error);
        }
        response.data.ok_or_else(|| {
            tracing::error!(function_name, "response has no data");
            AdaptorError::MalformedResponse {
                function_name: function_name.to_owned(),
                reason: "response has no data".to_owned(),
            }
        })
    }
}
