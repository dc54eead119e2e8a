/*!
The dynamic value model that reconstruction produces.

A parsed session hands back one [`StructValue`] per registered destination:
an ordered bag of field values mirroring the structure descriptor it was
built from. Callers that want a concrete type implement [`FromStructure`]
and convert, the same way a descriptor table gets a [`Describe`]
implementation on the way in.

[`Describe`]: crate::descriptor::Describe
*/

use core::fmt::{self, Display};

use joinery::JoinableIterator;

use crate::error::{Error, ErrorKind};

/// A single reconstructed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// An optional field that got no value.
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Struct(StructValue),
}

impl Value {
    /// A short name for the value's runtime type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Struct(_) => "struct",
        }
    }

    #[inline]
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Value::Int(value) => Some(value),
            _ => None,
        }
    }

    /// Get the value as a float. Integer values coerce, so that an overlay
    /// file can say `5` where a float field expects `5.0`.
    pub fn as_float(&self) -> Option<f64> {
        match *self {
            Value::Float(value) => Some(value),
            Value::Int(value) => Some(value as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            Value::Struct(value) => Some(value),
            _ => None,
        }
    }
}

/**
Render a value the way it would be typed on the command line. Used for
showing defaults in usage output.
*/
impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "none"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::Str(value) => write!(f, "{value}"),
            Value::List(values) => write!(f, "{}", values.iter().join_with(" ")),
            Value::Struct(value) => write!(f, "<{}>", value.name()),
        }
    }
}

/**
A reconstructed structure instance: the name of the structure type it was
built from, plus one value per field, in declaration order.

For a union-typed field, the field's value is the [`StructValue`] of the
*chosen* variant; [`name`][StructValue::name] tells you which one won.
*/
#[derive(Debug, Clone, PartialEq)]
pub struct StructValue {
    name: &'static str,
    fields: Vec<(&'static str, Value)>,
}

impl StructValue {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fields: Vec::new(),
        }
    }

    /// The name of the structure type this instance was reconstructed from.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, value)| value)
    }

    /// Set a field's value, appending it if it wasn't present yet.
    pub fn set(&mut self, field: &'static str, value: Value) {
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((field, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.fields.iter().map(|(name, value)| (*name, value))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fetch a field and convert it with the given accessor, producing a
    /// [`Reconstruction`][ErrorKind::Reconstruction] error when the field is
    /// absent or the wrong type. This is the workhorse for [`FromStructure`]
    /// implementations:
    ///
    /// ```ignore
    /// let batch_size = instance.field("batch_size", Value::as_int)?;
    /// ```
    pub fn field<'s, T>(
        &'s self,
        field: &str,
        get: impl FnOnce(&'s Value) -> Option<T>,
    ) -> Result<T, Error> {
        let value = self.get(field).ok_or_else(|| ErrorKind::Reconstruction {
            path: field.to_owned(),
            message: "field is absent".to_owned(),
        })?;

        get(value).ok_or_else(|| {
            ErrorKind::Reconstruction {
                path: field.to_owned(),
                message: format!("unexpected {} value", value.type_name()),
            }
            .into()
        })
    }
}

/**
Conversion from a reconstructed [`StructValue`] into a concrete type. The
inverse of [`Describe`][crate::descriptor::Describe]: where `Describe`
supplies the descriptor table that maps a type onto the command line,
`FromStructure` folds the parsed values back into the type.
*/
pub trait FromStructure: Sized {
    fn from_structure(value: &StructValue) -> Result<Self, Error>;
}
