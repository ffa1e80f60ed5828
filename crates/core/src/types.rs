//! Runtime type descriptors.
//!
//! Queries are untyped at compile time; `ObjectType` describes the runtime class of a
//! value and is what the method resolver and the result descriptors work with.

use core::fmt;
use serde::{Deserialize, Serialize};

/// Runtime type of a value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectType {
    /// Unknown or heterogeneous type (root of the hierarchy).
    Any,
    /// The UNDEFINED token.
    Undefined,
    /// The null reference.
    Null,
    Boolean,
    Int,
    Long,
    Double,
    String,
    /// A user object of the named class.
    Object(String),
    /// A struct (tuple) row.
    Struct,
    /// A collection of values.
    Collection,
    /// A region entry (key/value pair).
    Entry,
    /// A region handle.
    Region,
}

impl ObjectType {
    /// Returns the class name used for method resolution.
    pub fn class_name(&self) -> &str {
        match self {
            ObjectType::Any => "Object",
            ObjectType::Undefined => "Undefined",
            ObjectType::Null => "Null",
            ObjectType::Boolean => "Boolean",
            ObjectType::Int => "Integer",
            ObjectType::Long => "Long",
            ObjectType::Double => "Double",
            ObjectType::String => "String",
            ObjectType::Object(class) => class.as_str(),
            ObjectType::Struct => "Struct",
            ObjectType::Collection => "Collection",
            ObjectType::Entry => "Entry",
            ObjectType::Region => "Region",
        }
    }

    /// Returns true for the numeric primitive types.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ObjectType::Int | ObjectType::Long | ObjectType::Double)
    }

    /// Returns true for types that a null reference may stand in for.
    pub fn is_reference(&self) -> bool {
        !matches!(
            self,
            ObjectType::Boolean | ObjectType::Int | ObjectType::Long | ObjectType::Double
        )
    }

    /// Rank used for numeric widening (`Int` < `Long` < `Double`).
    pub fn numeric_rank(&self) -> Option<u8> {
        match self {
            ObjectType::Int => Some(0),
            ObjectType::Long => Some(1),
            ObjectType::Double => Some(2),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class_name())
    }
}

/// Shape of a struct (multi-column) result row.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructType {
    field_names: Vec<String>,
}

impl StructType {
    /// Creates a struct type with the given field names.
    pub fn new(field_names: Vec<String>) -> Self {
        Self { field_names }
    }

    /// Returns the field names in declaration order.
    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    /// Returns the position of a field.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.field_names.iter().position(|f| f == name)
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.field_names.len()
    }

    /// Returns true if the struct has no fields.
    pub fn is_empty(&self) -> bool {
        self.field_names.is_empty()
    }
}
