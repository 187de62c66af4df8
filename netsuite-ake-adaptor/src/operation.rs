//! Generates the operation text for a root field from an introspected schema.

use displaydoc::Display;
use thiserror::Error;

use crate::graphql::OperationType;
use crate::introspection::Field;
use crate::introspection::FullType;
use crate::introspection::Schema;
use crate::introspection::TypeKind;

const INDENT: &str = "  ";

/// Composite fields nested deeper than this are left out of the selection.
const MAX_SELECTION_DEPTH: usize = 5;

/// Error types for operation generation.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum OperationError {
    /// schema has no {operation_type} root type
    MissingRootType {
        /// The requested operation type.
        operation_type: OperationType,
    },

    /// {operation_type} type '{root_type}' has no field '{field}'
    UnknownField {
        /// The requested operation type.
        operation_type: OperationType,
        /// The root type that was searched.
        root_type: String,
        /// The requested field.
        field: String,
    },

    /// field '{field}' has no selectable subfields
    EmptySelection {
        /// The requested field.
        field: String,
    },
}

/// An executable operation built for a single root field.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Operation {
    /// The operation name, equal to the root field it selects.
    pub name: String,
    pub operation_type: OperationType,
    /// The operation text.
    pub query: String,
}

/// Build an operation selecting the root field `operation_name`.
///
/// Every argument of the field is exposed as a variable of the same name, so the
/// operation accepts the same variables the field does. The selection set covers
/// every field reachable without arguments, see [`SelectionWriter`].
pub fn build_operation(
    operation_name: &str,
    operation_type: OperationType,
    schema: &Schema,
) -> Result<Operation, OperationError> {
    let root_type = schema
        .root_type_name(operation_type)
        .and_then(|name| schema.type_by_name(name))
        .ok_or(OperationError::MissingRootType { operation_type })?;
    let field = root_type
        .field(operation_name)
        .ok_or_else(|| OperationError::UnknownField {
            operation_type,
            root_type: root_type.name.clone().unwrap_or_default(),
            field: operation_name.to_owned(),
        })?;

    let (definitions, arguments) = argument_lists(field);
    let mut writer = SelectionWriter::new(schema);
    let head = format!("{operation_name}{arguments}");
    match field.ty.named_type() {
        Some(type_name) => writer.write_field(head, type_name, 1),
        None => writer.lines.push(format!("{INDENT}{head}")),
    }
    if writer.lines.is_empty() {
        return Err(OperationError::EmptySelection {
            field: operation_name.to_owned(),
        });
    }

    Ok(Operation {
        name: operation_name.to_owned(),
        operation_type,
        query: format!(
            "{operation_type} {operation_name}{definitions} {{\n{}\n}}",
            writer.lines.join("\n")
        ),
    })
}

/// Returns the variable definitions and the matching call arguments, both
/// parenthesized, or two empty strings when the field takes no arguments.
fn argument_lists(field: &Field) -> (String, String) {
    if field.args.is_empty() {
        return (String::new(), String::new());
    }
    let definitions = field
        .args
        .iter()
        .map(|arg| format!("${}: {}", arg.name, arg.ty))
        .collect::<Vec<_>>();
    let arguments = field
        .args
        .iter()
        .map(|arg| format!("{0}: ${0}", arg.name))
        .collect::<Vec<_>>();
    (
        format!("({})", definitions.join(", ")),
        format!("({})", arguments.join(", ")),
    )
}

/// Writes selection sets line by line.
///
/// Scalars and enums are leaves. Objects and interfaces select all their
/// selectable fields, unions select `__typename` and one inline fragment per
/// member. A type that is already being expanded higher up the current path is
/// not expanded again.
struct SelectionWriter<'a> {
    schema: &'a Schema,
    visiting: Vec<&'a str>,
    lines: Vec<String>,
}

impl<'a> SelectionWriter<'a> {
    fn new(schema: &'a Schema) -> Self {
        Self {
            schema,
            visiting: Vec::new(),
            lines: Vec::new(),
        }
    }

    fn write_field(&mut self, head: String, type_name: &'a str, depth: usize) {
        let schema = self.schema;
        let indent = INDENT.repeat(depth);
        match schema.type_by_name(type_name) {
            Some(full_type) if full_type.kind.is_composite() => {
                if self.visiting.contains(&type_name) || self.visiting.len() >= MAX_SELECTION_DEPTH
                {
                    return;
                }
                let start = self.lines.len();
                self.lines.push(format!("{indent}{head} {{"));
                self.visiting.push(type_name);
                let written = self.write_selection(full_type, depth + 1);
                self.visiting.pop();
                if written {
                    self.lines.push(format!("{indent}}}"));
                } else {
                    self.lines.truncate(start);
                }
            }
            // Unknown types are selected as leaves.
            _ => self.lines.push(format!("{indent}{head}")),
        }
    }

    fn write_fragment(&mut self, type_name: &'a str, depth: usize) {
        let schema = self.schema;
        let Some(full_type) = schema.type_by_name(type_name) else {
            return;
        };
        if self.visiting.contains(&type_name) {
            return;
        }
        let indent = INDENT.repeat(depth);
        let start = self.lines.len();
        self.lines.push(format!("{indent}... on {type_name} {{"));
        self.visiting.push(type_name);
        let written = self.write_selection(full_type, depth + 1);
        self.visiting.pop();
        if written {
            self.lines.push(format!("{indent}}}"));
        } else {
            self.lines.truncate(start);
        }
    }

    /// Returns whether anything was written.
    fn write_selection(&mut self, full_type: &'a FullType, depth: usize) -> bool {
        let start = self.lines.len();
        if full_type.kind == TypeKind::Union {
            self.lines
                .push(format!("{}__typename", INDENT.repeat(depth)));
            for possible_type in full_type.possible_types.iter().flatten() {
                self.write_fragment(&possible_type.name, depth);
            }
        } else {
            for field in full_type
                .fields
                .iter()
                .flatten()
                .filter(|field| field.is_selectable())
            {
                if let Some(type_name) = field.ty.named_type() {
                    self.write_field(field.name.clone(), type_name, depth);
                }
            }
        }
        self.lines.len() > start
    }
}
