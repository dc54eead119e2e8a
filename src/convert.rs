/*!
Shape-directed conversion of raw command-line tokens into typed [`Value`]s.

The [`ConverterRegistry`] owns the conversion rules. Primitive shapes,
enumerations, optionals, and sequences convert with built-in rules; custom
shapes look up a converter function registered under the shape's identity.
The registry is owned by the session — registering a converter mutates that
registry and nothing else, and re-registering the same identity replaces
the earlier converter.
*/

use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;

use joinery::JoinableIterator;
use log::trace;

use crate::descriptor::{FieldDescriptor, Shape};
use crate::value::Value;

pub use parley_parser::RawValue;

/// The raw material a converter works from: the tokens collected for one
/// option occurrence.
#[derive(Debug, Clone, Copy)]
pub enum RawInput<'i> {
    /// The option appeared with no value token.
    Present,

    /// One value token.
    Single(&'i str),

    /// A list of value tokens.
    Many(&'i [&'i str]),
}

impl<'i> RawInput<'i> {
    pub(crate) fn from_raw(raw: &'i RawValue<'i>) -> Self {
        match raw {
            RawValue::Present => RawInput::Present,
            RawValue::Single(value) => RawInput::Single(*value),
            RawValue::Many(values) => RawInput::Many(values.as_slice()),
        }
    }

    /// The tokens, flattened. `Present` has none.
    pub fn tokens(&self) -> &[&'i str] {
        match self {
            RawInput::Present => &[],
            RawInput::Single(value) => core::slice::from_ref(value),
            RawInput::Many(values) => values,
        }
    }

    fn render(&self) -> String {
        match self {
            RawInput::Present => String::new(),
            RawInput::Single(value) => (*value).to_owned(),
            RawInput::Many(values) => values.iter().join_with(" ").to_string(),
        }
    }
}

/// A conversion failure, not yet attached to a destination path. The caller
/// that knows the path upgrades this into a full
/// [`ValueConversion`][crate::ErrorKind::ValueConversion] error.
#[derive(Debug, Clone)]
pub(crate) struct ConvertFailure {
    pub raw: String,
    pub expected: String,
    pub message: String,
}

impl ConvertFailure {
    fn new(raw: impl fmt::Display, expected: &Shape, message: impl Into<String>) -> Self {
        Self {
            raw: raw.to_string(),
            expected: expected.describe(),
            message: message.into(),
        }
    }
}

/// A user-registered conversion function.
pub type CustomConverter = Arc<dyn Fn(RawInput<'_>) -> Result<Value, String> + Send + Sync>;

/// The conversion rules for one parser session.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    custom: HashMap<&'static str, CustomConverter>,
}

impl ConverterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a converter under `id`. Registering the same identity again
    /// replaces the earlier converter.
    pub fn register(
        &mut self,
        id: &'static str,
        converter: impl Fn(RawInput<'_>) -> Result<Value, String> + Send + Sync + 'static,
    ) {
        self.custom.insert(id, Arc::new(converter));
    }

    #[inline]
    #[must_use]
    pub fn is_registered(&self, id: &str) -> bool {
        self.custom.contains_key(id)
    }

    /// Convert the raw tokens collected for `field` into a typed value,
    /// honoring the field's converter override and choice constraint.
    pub(crate) fn convert_field(
        &self,
        field: &FieldDescriptor,
        raw: RawInput<'_>,
    ) -> Result<Value, ConvertFailure> {
        trace!(
            "converting field '{}' from {raw:?} as {shape:?}",
            field.name(),
            shape = field.shape(),
        );

        if let Some(choices) = field.choice_constraint() {
            for &token in raw.tokens() {
                if !choices.iter().any(|choice| choice == token) {
                    return Err(ConvertFailure::new(
                        raw.render(),
                        field.shape(),
                        format!("expected one of: {}", choices.iter().join_with(", ")),
                    ));
                }
            }
        }

        match field.converter_override() {
            Some(id) => self.convert_custom(id, field.shape(), raw),
            None => self.convert_shape(field.shape(), raw),
        }
    }

    /// Convert raw tokens according to a shape, with no field metadata in
    /// play.
    pub(crate) fn convert_shape(
        &self,
        shape: &Shape,
        raw: RawInput<'_>,
    ) -> Result<Value, ConvertFailure> {
        match shape {
            Shape::Bool => match raw {
                // a bare flag means true
                RawInput::Present => Ok(Value::Bool(true)),
                RawInput::Single(token) => parse_bool(token)
                    .map(Value::Bool)
                    .ok_or_else(|| ConvertFailure::new(token, shape, BOOL_TOKENS_MESSAGE)),
                RawInput::Many(_) => Err(ConvertFailure::new(
                    raw.render(),
                    shape,
                    "expected a single value",
                )),
            },

            Shape::Int => {
                let token = single(shape, raw)?;
                token
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|error| ConvertFailure::new(token, shape, error.to_string()))
            }

            Shape::Float => {
                let token = single(shape, raw)?;
                token
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|error| ConvertFailure::new(token, shape, error.to_string()))
            }

            Shape::Str => single(shape, raw).map(|token| Value::Str(token.to_owned())),

            // member names match exactly, case-sensitively
            Shape::Enum(members) => {
                let token = single(shape, raw)?;
                match members.members.contains(&token) {
                    true => Ok(Value::Str(token.to_owned())),
                    false => Err(ConvertFailure::new(
                        token,
                        shape,
                        format!(
                            "expected one of: {}",
                            members.members.iter().join_with(", ")
                        ),
                    )),
                }
            }

            Shape::Optional(inner) => self.convert_shape(inner, raw),

            Shape::FixedSeq(inner, len) => {
                let tokens = raw.tokens();
                if tokens.len() != *len {
                    return Err(ConvertFailure::new(
                        raw.render(),
                        shape,
                        format!("expected exactly {len} values, got {}", tokens.len()),
                    ));
                }
                self.convert_items(inner, tokens)
            }

            Shape::VarSeq(inner) => self.convert_items(inner, raw.tokens()),

            Shape::Custom(custom) => self.convert_custom(custom.id, shape, raw),

            Shape::Struct(_) | Shape::Union(_) => Err(ConvertFailure::new(
                raw.render(),
                shape,
                "structures are reconstructed from their fields, not converted",
            )),
        }
    }

    fn convert_items(&self, inner: &Shape, tokens: &[&str]) -> Result<Value, ConvertFailure> {
        tokens
            .iter()
            .map(|&token| self.convert_shape(inner, RawInput::Single(token)))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List)
    }

    fn convert_custom(
        &self,
        id: &str,
        shape: &Shape,
        raw: RawInput<'_>,
    ) -> Result<Value, ConvertFailure> {
        let converter = self
            .custom
            .get(id)
            .ok_or_else(|| ConvertFailure::new(raw.render(), shape, "no such converter"))?;

        converter(raw).map_err(|message| ConvertFailure::new(raw.render(), shape, message))
    }

    /// Check and coerce a value that arrived from an overlay mapping rather
    /// than the command line. Overlay values are already typed, so this is
    /// validation plus the few tolerated coercions (int where float is
    /// expected, a string member name for an enumeration).
    pub(crate) fn coerce_field(
        &self,
        field: &FieldDescriptor,
        value: &Value,
    ) -> Result<Value, ConvertFailure> {
        if let Some(choices) = field.choice_constraint()
            && let Value::Str(token) = value
            && !choices.iter().any(|choice| choice == token)
        {
            return Err(ConvertFailure::new(
                token,
                field.shape(),
                format!("expected one of: {}", choices.iter().join_with(", ")),
            ));
        }

        self.coerce_shape(field.shape(), value)
    }

    fn coerce_shape(&self, shape: &Shape, value: &Value) -> Result<Value, ConvertFailure> {
        let mismatch =
            || ConvertFailure::new(value, shape, format!("unexpected {} value", value.type_name()));

        match shape {
            Shape::Bool => value.as_bool().map(Value::Bool).ok_or_else(mismatch),
            Shape::Int => value.as_int().map(Value::Int).ok_or_else(mismatch),
            Shape::Float => value.as_float().map(Value::Float).ok_or_else(mismatch),
            Shape::Str => value
                .as_str()
                .map(|token| Value::Str(token.to_owned()))
                .ok_or_else(mismatch),

            Shape::Enum(members) => {
                let token = value.as_str().ok_or_else(mismatch)?;
                match members.members.contains(&token) {
                    true => Ok(Value::Str(token.to_owned())),
                    false => Err(ConvertFailure::new(
                        token,
                        shape,
                        format!(
                            "expected one of: {}",
                            members.members.iter().join_with(", ")
                        ),
                    )),
                }
            }

            Shape::Optional(inner) => match value {
                Value::None => Ok(Value::None),
                value => self.coerce_shape(inner, value),
            },

            Shape::FixedSeq(inner, len) => {
                let items = value.as_list().ok_or_else(mismatch)?;
                if items.len() != *len {
                    return Err(ConvertFailure::new(
                        value,
                        shape,
                        format!("expected exactly {len} values, got {}", items.len()),
                    ));
                }
                items
                    .iter()
                    .map(|item| self.coerce_shape(inner, item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::List)
            }

            Shape::VarSeq(inner) => {
                let items = value.as_list().ok_or_else(mismatch)?;
                items
                    .iter()
                    .map(|item| self.coerce_shape(inner, item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::List)
            }

            // a string runs through the registered converter; anything else
            // is trusted as already converted
            Shape::Custom(custom) => match value {
                Value::Str(token) => self.convert_custom(custom.id, shape, RawInput::Single(token)),
                value => Ok(value.clone()),
            },

            Shape::Struct(_) | Shape::Union(_) => Err(ConvertFailure::new(
                value,
                shape,
                "structures are reconstructed from their fields, not converted",
            )),
        }
    }
}

/// Expect exactly one token out of the raw input.
fn single<'i>(shape: &Shape, raw: RawInput<'i>) -> Result<&'i str, ConvertFailure> {
    match raw {
        RawInput::Single(token) => Ok(token),
        RawInput::Many(tokens) if tokens.len() == 1 => Ok(tokens[0]),
        _ => Err(ConvertFailure::new(
            raw.render(),
            shape,
            "expected a single value",
        )),
    }
}

const BOOL_TOKENS_MESSAGE: &str = "expected one of: true, false, yes, no, 1, 0, on, off";

/// The fixed recognized token set for booleans, case-insensitive.
fn parse_bool(token: &str) -> Option<bool> {
    match token.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::EnumShape;

    fn registry() -> ConverterRegistry {
        ConverterRegistry::new()
    }

    #[test]
    fn bool_token_set() {
        let registry = registry();

        for token in ["true", "YES", "1", "On"] {
            assert_eq!(
                registry
                    .convert_shape(&Shape::Bool, RawInput::Single(token))
                    .unwrap(),
                Value::Bool(true),
                "token {token:?}",
            );
        }

        for token in ["false", "No", "0", "OFF"] {
            assert_eq!(
                registry
                    .convert_shape(&Shape::Bool, RawInput::Single(token))
                    .unwrap(),
                Value::Bool(false),
                "token {token:?}",
            );
        }

        assert!(
            registry
                .convert_shape(&Shape::Bool, RawInput::Single("maybe"))
                .is_err()
        );
    }

    #[test]
    fn enum_members_are_case_sensitive() {
        let registry = registry();
        let shape = Shape::Enum(EnumShape::new("Color", &["red", "green"]));

        assert_eq!(
            registry
                .convert_shape(&shape, RawInput::Single("red"))
                .unwrap(),
            Value::Str("red".to_owned()),
        );

        let failure = registry
            .convert_shape(&shape, RawInput::Single("Red"))
            .unwrap_err();
        assert!(failure.message.contains("red"));
        assert!(failure.message.contains("green"));
    }

    #[test]
    fn fixed_sequence_length_is_exact() {
        let registry = registry();
        let shape = Shape::fixed_seq(Shape::Int, 2);

        assert_eq!(
            registry
                .convert_shape(&shape, RawInput::Many(&["3", "4"]))
                .unwrap(),
            Value::List(vec![Value::Int(3), Value::Int(4)]),
        );

        assert!(
            registry
                .convert_shape(&shape, RawInput::Many(&["3"]))
                .is_err()
        );
    }

    #[test]
    fn custom_converter_last_registration_wins() {
        let mut registry = registry();

        registry.register("celsius", |_| Ok(Value::Int(1)));
        registry.register("celsius", |_| Ok(Value::Int(2)));

        let shape = Shape::Custom(crate::descriptor::CustomShape::new("celsius"));
        assert_eq!(
            registry
                .convert_shape(&shape, RawInput::Single("ignored"))
                .unwrap(),
            Value::Int(2),
        );
    }

    #[test]
    fn int_coerces_to_float_from_overlays() {
        let registry = registry();

        assert_eq!(
            registry
                .coerce_shape(&Shape::Float, &Value::Int(5))
                .unwrap(),
            Value::Float(5.0),
        );
        assert!(registry.coerce_shape(&Shape::Int, &Value::Float(5.0)).is_err());
    }
}
