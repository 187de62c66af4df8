//! Fetches named NetSuite data views through a GraphQL function hosted on AWS Lambda.
//!
//! A data view is a named SuiteQL query. [`NetSuiteAkeAdaptor::get_data_view`]
//! applies filters and pagination to it, runs it through the `suiteqlResult`
//! field of the remote schema and returns the rows as a [`ResultEnvelope`].

mod adaptor;
mod composer;
pub mod configuration;
pub mod error;
mod executable;
mod executor;
pub mod graphql;
pub mod introspection;
pub mod invoker;
mod operation;
mod schema_cache;
#[cfg(test)]
mod test_log;

pub use crate::adaptor::NetSuiteAkeAdaptor;
pub use crate::adaptor::ResultEnvelope;
pub use crate::adaptor::SUITEQL_FUNCTION_NAME;
pub use crate::adaptor::SUITEQL_OPERATION_NAME;
pub use crate::composer::ComposedQuery;
pub use crate::composer::DataViewParameters;
pub use crate::composer::FilterClause;
pub use crate::composer::QueryComposer;
pub use crate::composer::QueryRequest;
pub use crate::configuration::Configuration;
pub use crate::configuration::DataViewDefinition;
pub use crate::error::AdaptorError;
pub use crate::executable::main;
pub use crate::executor::QueryExecutor;
pub use crate::operation::Operation;
pub use crate::operation::build_operation;
pub use crate::schema_cache::SchemaCache;
