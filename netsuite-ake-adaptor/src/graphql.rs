//! GraphQL request and response types exchanged with the remote functions.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// A json object
pub type Object = Map<String, Value>;

/// The kind of a GraphQL operation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// A read-only fetch, rooted at the schema's query type.
    Query,
    /// A write followed by a fetch, rooted at the schema's mutation type.
    Mutation,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationType::Query => f.write_str("query"),
            OperationType::Mutation => f.write_str("mutation"),
        }
    }
}

impl FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("query") {
            Ok(OperationType::Query)
        } else if s.eq_ignore_ascii_case("mutation") {
            Ok(OperationType::Mutation)
        } else {
            Err(format!("unsupported operation type '{s}'"))
        }
    }
}

/// A graphql request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// The operation text.
    pub query: String,

    /// The name of the operation to run when `query` holds more than one.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub operation_name: Option<String>,

    /// Values for the variables the operation declares.
    #[serde(skip_serializing_if = "Object::is_empty", default)]
    pub variables: Object,
}

impl Request {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            operation_name: None,
            variables: Object::new(),
        }
    }

    pub fn with_operation_name(mut self, operation_name: impl Into<String>) -> Self {
        self.operation_name = Some(operation_name.into());
        self
    }

    pub fn with_variables(mut self, variables: Object) -> Self {
        self.variables = variables;
        self
    }
}

/// A graphql response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// The data returned by the operation, absent when execution failed before
    /// any field resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Error>,

    #[serde(default, skip_serializing_if = "Object::is_empty")]
    pub extensions: Object,
}

impl Response {
    /// Decode a response from the payload a remote function returned.
    ///
    /// Functions fronted by a proxy integration wrap the response in an
    /// envelope whose `body` carries it, either as an object or as a json
    /// encoded string. Both shapes are unwrapped here.
    pub fn from_invocation(payload: Value) -> Result<Self, serde_json::Error> {
        match payload {
            Value::Object(mut envelope) if is_proxy_envelope(&envelope) => {
                match envelope.remove("body").unwrap_or_default() {
                    Value::String(body) => serde_json::from_str(&body),
                    body => serde_json::from_value(body),
                }
            }
            payload => serde_json::from_value(payload),
        }
    }
}

fn is_proxy_envelope(envelope: &Object) -> bool {
    envelope.contains_key("body") && !envelope.contains_key("data")
}

/// A GraphQL error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Error {
    /// The error message.
    pub message: String,

    /// The locations of the error in the operation text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,

    /// The path of the field that failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,

    /// Additional error information supplied by the remote side.
    #[serde(default, skip_serializing_if = "Object::is_empty")]
    pub extensions: Object,
}

/// A location in a file in a graphql error.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}
