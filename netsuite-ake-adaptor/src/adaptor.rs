//! The adaptor facade.

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::composer::DataViewParameters;
use crate::composer::QueryComposer;
use crate::composer::QueryRequest;
use crate::configuration::Configuration;
use crate::configuration::DataViewDefinition;
use crate::error::AdaptorError;
use crate::executor::QueryExecutor;
use crate::graphql::Object;
use crate::graphql::OperationType;
use crate::introspection::Schema;
use crate::invoker::LambdaInvoker;
use crate::invoker::RemoteInvoker;

/// The function serving SuiteQL queries.
pub const SUITEQL_FUNCTION_NAME: &str = "netsuite_graphql";
/// The root field running a SuiteQL query.
pub const SUITEQL_OPERATION_NAME: &str = "suiteqlResult";

/// One page of the rows of a data view.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    /// The rows, as returned by the remote side.
    pub results: Vec<Value>,
    /// The number of rows in `results`.
    pub count: u64,
    /// Whether rows follow this page.
    pub has_more: bool,
    /// The position of the first row of `results`.
    pub offset: u64,
    /// The number of rows across all pages.
    pub total: u64,
}

/// The `suiteqlResult` field of a response. Every field is required.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuiteqlResult {
    items: Vec<Value>,
    count: u64,
    has_more: bool,
    offset: u64,
    total_results: u64,
}

impl From<SuiteqlResult> for ResultEnvelope {
    fn from(result: SuiteqlResult) -> Self {
        ResultEnvelope {
            results: result.items,
            count: result.count,
            has_more: result.has_more,
            offset: result.offset,
            total: result.total_results,
        }
    }
}

/// Fetches named data views and runs GraphQL operations on remote functions.
///
/// Schemas are cached for the lifetime of the adaptor. Calls are not retried
/// and nothing is spawned: every operation completes its round trips before
/// returning.
pub struct NetSuiteAkeAdaptor {
    composer: QueryComposer,
    executor: QueryExecutor,
}

impl NetSuiteAkeAdaptor {
    /// Create an adaptor invoking functions on AWS Lambda.
    pub async fn new(configuration: Configuration) -> Result<Self, AdaptorError> {
        let invoker = LambdaInvoker::new(&configuration).await?;
        Self::with_invoker(configuration, Arc::new(invoker))
    }

    /// Create an adaptor invoking functions through `invoker`.
    pub fn with_invoker(
        configuration: Configuration,
        invoker: Arc<dyn RemoteInvoker>,
    ) -> Result<Self, AdaptorError> {
        configuration.validate().map_err(|err| {
            tracing::error!(error = %err, "invalid configuration");
            err
        })?;
        let Configuration {
            endpoint_id,
            data_views,
            ..
        } = configuration;
        Ok(Self {
            composer: QueryComposer::new(data_views),
            executor: QueryExecutor::new(endpoint_id, invoker),
        })
    }

    /// The configured data views, in configuration order.
    pub fn data_views(&self) -> &[DataViewDefinition] {
        self.composer.data_views()
    }

    /// The schema of `function_name`. Only the first call for a function
    /// reaches it.
    pub async fn fetch_graphql_schema(
        &self,
        function_name: &str,
    ) -> Result<Arc<Schema>, AdaptorError> {
        self.executor.fetch_schema(function_name).await
    }

    /// Run the root field `operation_name` of `function_name` with `variables`
    /// and return the `data` of the response.
    pub async fn execute_graphql_query(
        &self,
        function_name: &str,
        operation_name: &str,
        operation_type: OperationType,
        variables: Object,
    ) -> Result<Object, AdaptorError> {
        self.executor
            .execute(function_name, operation_name, operation_type, variables)
            .await
    }

    /// Fetch the rows of the data view `view_name`.
    ///
    /// Returns `Ok(None)` without calling any function when no data view has
    /// that name.
    pub async fn get_data_view(
        &self,
        view_name: &str,
        parameters: DataViewParameters,
    ) -> Result<Option<ResultEnvelope>, AdaptorError> {
        let request = QueryRequest::new(view_name, parameters);
        let Some(composed) = self.composer.compose(&request) else {
            tracing::debug!(view_name, "no such data view");
            return Ok(None);
        };

        let mut data = self
            .execute_graphql_query(
                SUITEQL_FUNCTION_NAME,
                SUITEQL_OPERATION_NAME,
                OperationType::Query,
                composed.variables,
            )
            .await?;
        normalize(data.remove(SUITEQL_OPERATION_NAME)).map(Some)
    }
}

fn normalize(result: Option<Value>) -> Result<ResultEnvelope, AdaptorError> {
    let shape_error = |reason: String| {
        tracing::error!(operation_name = SUITEQL_OPERATION_NAME, %reason, "unexpected result");
        AdaptorError::ResponseShape {
            operation_name: SUITEQL_OPERATION_NAME.to_owned(),
            reason,
        }
    };
    match result {
        Some(result @ Value::Object(_)) => serde_json::from_value::<SuiteqlResult>(result)
            .map(ResultEnvelope::from)
            .map_err(|err| shape_error(err.to_string())),
        Some(other) => Err(shape_error(format!("expected an object, got {other}"))),
        None => Err(shape_error("the field is missing".to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::composer::FilterClause;
    use crate::invoker::MockRemoteInvoker;
    use crate::test_log::with_captured_logs;

    fn configuration() -> Configuration {
        Configuration::new("ake")
            .with_data_view(DataViewDefinition::new(
                "sales_by_region",
                "SELECT region, SUM(amount) AS total FROM sales",
            ))
            .with_data_view(DataViewDefinition::new(
                "customers",
                "SELECT id, companyname FROM customer",
            ))
    }

    fn introspection_response() -> Value {
        let schema: Value = serde_json::from_str(include_str!("testdata/schema.json")).unwrap();
        json!({ "data": { "__schema": schema } })
    }

    fn is_introspection(payload: &Value) -> bool {
        payload["params"]["query"]
            .as_str()
            .is_some_and(|query| query.contains("__schema"))
    }

    fn adaptor(invoker: MockRemoteInvoker) -> NetSuiteAkeAdaptor {
        NetSuiteAkeAdaptor::with_invoker(configuration(), Arc::new(invoker)).unwrap()
    }

    fn suiteql_invoker(result: Value) -> MockRemoteInvoker {
        let mut invoker = MockRemoteInvoker::new();
        invoker
            .expect_invoke()
            .withf(|_, payload| is_introspection(payload))
            .times(1)
            .returning(|_, _| Ok(introspection_response()));
        invoker
            .expect_invoke()
            .withf(|_, payload| !is_introspection(payload))
            .returning(move |function_name, _| {
                assert_eq!(function_name, SUITEQL_FUNCTION_NAME);
                Ok(json!({ "data": { "suiteqlResult": result.clone() } }))
            });
        invoker
    }

    #[tokio::test]
    async fn test_get_data_view() {
        let items = json!([
            { "region": "APAC", "total": 1200 },
            { "region": "EMEA", "total": 800 },
            { "region": "AMER", "total": 3000 }
        ]);
        let adaptor = adaptor(suiteql_invoker(json!({
            "items": items,
            "count": 3,
            "hasMore": false,
            "offset": 0,
            "totalResults": 3,
            "links": []
        })));

        let envelope = adaptor
            .get_data_view("sales_by_region", DataViewParameters::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({
                "results": items,
                "count": 3,
                "has_more": false,
                "offset": 0,
                "total": 3
            })
        );
    }

    #[tokio::test]
    async fn test_get_data_view_sends_composed_variables() {
        let mut invoker = MockRemoteInvoker::new();
        invoker
            .expect_invoke()
            .withf(|_, payload| is_introspection(payload))
            .returning(|_, _| Ok(introspection_response()));
        invoker
            .expect_invoke()
            .withf(|_, payload| !is_introspection(payload))
            .times(1)
            .returning(|_, payload| {
                assert_eq!(
                    payload["params"]["variables"],
                    json!({
                        "suiteql": "SELECT a.* FROM (SELECT region, SUM(amount) AS total FROM sales) a WHERE a.region = 'APAC'",
                        "limit": 50
                    })
                );
                Ok(json!({
                    "data": {
                        "suiteqlResult": {
                            "items": [{ "region": "APAC", "total": 1200 }],
                            "count": 1,
                            "hasMore": false,
                            "offset": 0,
                            "totalResults": 1
                        }
                    }
                }))
            });
        let adaptor = adaptor(invoker);

        let parameters = DataViewParameters::new()
            .with_filter(FilterClause::new("region", "=", "'APAC'"))
            .with_limit(50);
        let envelope = adaptor
            .get_data_view("sales_by_region", parameters)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(envelope.count, 1);
        assert_eq!(envelope.total, 1);
    }

    #[tokio::test]
    async fn test_unknown_view_makes_no_call() {
        let mut invoker = MockRemoteInvoker::new();
        invoker.expect_invoke().never();
        let adaptor = adaptor(invoker);

        let envelope = adaptor
            .get_data_view("sales_by_month", DataViewParameters::new())
            .await
            .unwrap();
        assert_eq!(envelope, None);
    }

    #[tokio::test]
    async fn test_missing_result_field_is_an_error() {
        let adaptor = adaptor(suiteql_invoker(json!({
            "items": [],
            "count": 0,
            "offset": 0,
            "totalResults": 0
        })));

        let error = adaptor
            .get_data_view("customers", DataViewParameters::new())
            .await
            .unwrap_err();
        match error {
            AdaptorError::ResponseShape { reason, .. } => {
                assert!(reason.contains("hasMore"), "{reason}")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_null_result_is_an_error() {
        let adaptor = adaptor(suiteql_invoker(Value::Null));

        let error = adaptor
            .get_data_view("customers", DataViewParameters::new())
            .await
            .unwrap_err();
        assert!(matches!(error, AdaptorError::ResponseShape { .. }));
    }

    #[tokio::test]
    async fn test_schema_is_fetched_once_across_calls() {
        let adaptor = adaptor(suiteql_invoker(json!({
            "items": [],
            "count": 0,
            "hasMore": false,
            "offset": 0,
            "totalResults": 0
        })));

        adaptor
            .fetch_graphql_schema(SUITEQL_FUNCTION_NAME)
            .await
            .unwrap();
        adaptor
            .fetch_graphql_schema(SUITEQL_FUNCTION_NAME)
            .await
            .unwrap();
        for _ in 0..2 {
            adaptor
                .get_data_view("customers", DataViewParameters::new())
                .await
                .unwrap()
                .unwrap();
        }
    }

    #[test]
    fn test_invalid_configuration() {
        let result =
            NetSuiteAkeAdaptor::with_invoker(Configuration::new(""), Arc::new(MockRemoteInvoker::new()));
        assert!(matches!(result, Err(AdaptorError::Configuration(_))));
    }

    #[test]
    fn test_duplicate_data_view_warning_is_not_repeated() {
        let (adaptor, logs) = with_captured_logs(|| {
            let configuration: Configuration = r#"
endpoint_id: ake
data_views:
  - name: customers
    base_query: SELECT id FROM customer
  - name: customers
    base_query: SELECT companyname FROM customer
"#
            .parse()
            .unwrap();
            NetSuiteAkeAdaptor::with_invoker(configuration, Arc::new(MockRemoteInvoker::new()))
        });
        assert!(adaptor.is_ok());
        assert_eq!(logs.matches("defined more than once").count(), 1, "{logs}");
    }

    #[test]
    fn test_data_views() {
        let adaptor = adaptor(MockRemoteInvoker::new());
        let names = adaptor
            .data_views()
            .iter()
            .map(|data_view| data_view.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["sales_by_region", "customers"]);
    }
}
