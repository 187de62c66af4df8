//! Object model for the schema a remote function describes through introspection.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::graphql::OperationType;

/// The introspection query sent to a remote function when its schema is not cached yet.
pub const INTROSPECTION_QUERY: &str = r#"query IntrospectionQuery {
  __schema {
    queryType { name }
    mutationType { name }
    types {
      kind
      name
      fields(includeDeprecated: true) {
        name
        args { name type { ...TypeRef } defaultValue }
        type { ...TypeRef }
      }
      possibleTypes { name }
    }
  }
}

fragment TypeRef on __Type {
  kind
  name
  ofType {
    kind
    name
    ofType {
      kind
      name
      ofType {
        kind
        name
        ofType { kind name ofType { kind name ofType { kind name } } }
      }
    }
  }
}"#;

/// The `__schema` object returned by the introspection query.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(default)]
    pub query_type: Option<NamedType>,
    #[serde(default)]
    pub mutation_type: Option<NamedType>,
    #[serde(default)]
    pub types: Vec<FullType>,
}

impl Schema {
    /// Extract the schema from the data of an introspection response.
    pub fn from_data(mut data: Value) -> Result<Self, serde_json::Error> {
        let schema = data
            .get_mut("__schema")
            .map(Value::take)
            .unwrap_or_default();
        serde_json::from_value(schema)
    }

    /// The name of the type operations of `operation_type` are rooted at.
    pub fn root_type_name(&self, operation_type: OperationType) -> Option<&str> {
        match operation_type {
            OperationType::Query => self.query_type.as_ref(),
            OperationType::Mutation => self.mutation_type.as_ref(),
        }
        .map(|named| named.name.as_str())
    }

    pub fn type_by_name(&self, name: &str) -> Option<&FullType> {
        self.types
            .iter()
            .find(|full_type| full_type.name.as_deref() == Some(name))
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NamedType {
    pub name: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypeKind {
    Scalar,
    Object,
    Interface,
    Union,
    Enum,
    InputObject,
    List,
    NonNull,
}

impl TypeKind {
    /// Whether a field of this kind needs a selection set.
    pub fn is_composite(self) -> bool {
        matches!(self, TypeKind::Object | TypeKind::Interface | TypeKind::Union)
    }
}

/// A type definition from the `types` list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullType {
    pub kind: TypeKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub fields: Option<Vec<Field>>,
    #[serde(default)]
    pub possible_types: Option<Vec<NamedType>>,
}

impl FullType {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().flatten().find(|field| field.name == name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(default)]
    pub args: Vec<InputValue>,
    #[serde(rename = "type")]
    pub ty: TypeRef,
}

impl Field {
    /// Fields can be selected without arguments unless one of their arguments is required.
    /// Introspection meta fields are never selected.
    pub fn is_selectable(&self) -> bool {
        !self.name.starts_with("__") && !self.args.iter().any(InputValue::is_required)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputValue {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeRef,
    #[serde(default)]
    pub default_value: Option<String>,
}

impl InputValue {
    pub fn is_required(&self) -> bool {
        self.ty.kind == TypeKind::NonNull && self.default_value.is_none()
    }
}

/// A reference to a type, possibly wrapped in list and non-null modifiers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeRef {
    pub kind: TypeKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub of_type: Option<Box<TypeRef>>,
}

impl TypeRef {
    /// The name of the innermost type, with list and non-null wrappers removed.
    pub fn named_type(&self) -> Option<&str> {
        match &self.of_type {
            Some(inner) if matches!(self.kind, TypeKind::List | TypeKind::NonNull) => {
                inner.named_type()
            }
            _ => self.name.as_deref(),
        }
    }
}

/// Renders the reference the way it is written in a variable definition, e.g. `[String!]!`.
impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, &self.of_type) {
            (TypeKind::NonNull, Some(inner)) => write!(f, "{inner}!"),
            (TypeKind::List, Some(inner)) => write!(f, "[{inner}]"),
            _ => f.write_str(self.name.as_deref().unwrap_or_default()),
        }
    }
}
