//! Builds the SuiteQL query and variables for a data view request.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::configuration::DataViewDefinition;
use crate::graphql::Object;

/// The alias the base query is selected under when filters apply.
const CORRELATION_ALIAS: &str = "a";

pub(crate) const SUITEQL_VARIABLE: &str = "suiteql";
pub(crate) const LIMIT_VARIABLE: &str = "limit";
pub(crate) const OFFSET_VARIABLE: &str = "offset";

/// A predicate on one attribute of a data view, e.g. `region = 'APAC'`.
///
/// Neither the operator nor the value is checked or escaped: the value is
/// written into the query as given, quotes included.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FilterClause {
    pub attribute: String,
    pub operator: String,
    pub value: String,
}

impl FilterClause {
    pub fn new(
        attribute: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            attribute: attribute.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }

    /// The predicate as written in the composed query.
    fn fragment(&self) -> String {
        format!(
            "{CORRELATION_ALIAS}.{} {} {}",
            self.attribute, self.operator, self.value
        )
    }
}

impl fmt::Display for FilterClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.attribute, self.operator, self.value)
    }
}

/// Parses `<attribute> <operator> <value>`. The value is everything after the
/// operator, so it may contain whitespace.
impl FromStr for FilterClause {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        next_token(s)
            .and_then(|(attribute, rest)| {
                let (operator, value) = next_token(rest)?;
                let value = value.trim();
                (!value.is_empty()).then(|| FilterClause::new(attribute, operator, value))
            })
            .ok_or_else(|| {
                format!("invalid filter '{s}', expected '<attribute> <operator> <value>'")
            })
    }
}

/// The first whitespace-separated token of `s` and what follows it.
fn next_token(s: &str) -> Option<(&str, &str)> {
    s.trim_start().split_once(char::is_whitespace)
}

/// Optional filtering and pagination of a data view.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct DataViewParameters {
    /// Predicates ANDed together, in order.
    #[serde(default)]
    pub filters: Vec<FilterClause>,

    /// Maximum number of items to return. Zero is treated as not set.
    #[serde(default)]
    pub limit: Option<u64>,

    /// Number of items to skip. Zero is treated as not set.
    #[serde(default)]
    pub offset: Option<u64>,
}

impl DataViewParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: FilterClause) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// A request for the rows of a named data view.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub view_name: String,
    #[serde(flatten)]
    pub parameters: DataViewParameters,
}

impl QueryRequest {
    pub fn new(view_name: impl Into<String>, parameters: DataViewParameters) -> Self {
        Self {
            view_name: view_name.into(),
            parameters,
        }
    }
}

/// The query text and the variables it is executed with.
#[derive(Clone, Debug, PartialEq)]
pub struct ComposedQuery {
    pub suiteql: String,
    pub variables: Object,
}

/// Resolves data views by name and composes their queries.
#[derive(Clone, Debug, Default)]
pub struct QueryComposer {
    data_views: Vec<DataViewDefinition>,
}

impl QueryComposer {
    pub fn new(data_views: Vec<DataViewDefinition>) -> Self {
        Self { data_views }
    }

    /// Exact name lookup. When several views share a name the first one wins.
    pub fn data_view(&self, view_name: &str) -> Option<&DataViewDefinition> {
        self.data_views
            .iter()
            .find(|data_view| data_view.name == view_name)
    }

    pub fn data_views(&self) -> &[DataViewDefinition] {
        &self.data_views
    }

    /// Compose the query for `request`, or `None` when no view has its name.
    ///
    /// Without filters the base query is used as is. With filters it becomes a
    /// sub-query: `SELECT a.* FROM (<base query>) a WHERE a.<attribute> <operator> <value> AND ...`.
    pub fn compose(&self, request: &QueryRequest) -> Option<ComposedQuery> {
        let data_view = self.data_view(&request.view_name)?;
        let parameters = &request.parameters;

        let suiteql = if parameters.filters.is_empty() {
            data_view.base_query.clone()
        } else {
            let fragments = parameters
                .filters
                .iter()
                .map(FilterClause::fragment)
                .collect::<Vec<_>>();
            format!(
                "SELECT {CORRELATION_ALIAS}.* FROM ({}) {CORRELATION_ALIAS} WHERE {}",
                data_view.base_query,
                fragments.join(" AND ")
            )
        };

        let mut variables = Object::new();
        variables.insert(SUITEQL_VARIABLE.to_owned(), Value::from(suiteql.as_str()));
        if let Some(limit) = parameters.limit.filter(|limit| *limit != 0) {
            variables.insert(LIMIT_VARIABLE.to_owned(), Value::from(limit));
        }
        if let Some(offset) = parameters.offset.filter(|offset| *offset != 0) {
            variables.insert(OFFSET_VARIABLE.to_owned(), Value::from(offset));
        }

        tracing::debug!(
            view_name = %request.view_name,
            filters = parameters.filters.len(),
            "composed data view query"
        );
        Some(ComposedQuery { suiteql, variables })
    }
}
