/*!
Rebuilding nested structure values from parsed raw values.

Reconstruction walks each registration's descriptor tree bottom-up, filling
leaf fields from (in decreasing priority) the command line, the overlay
stack, and the field's own declared default. Union-typed fields consult the
variant selection fixed during compilation and reconstruct only the chosen
variant; values that arrived for the other variants were consumed as
discards and never reach this module.

Computed fields are never assigned directly: they are seeded as
[`Value::None`] and left to the structure's post-construction hook.
*/

use std::collections::HashMap;

use parley_parser::RawValues;

use crate::convert::{ConvertFailure, ConverterRegistry, RawInput};
use crate::descriptor::{FieldDescriptor, Shape, StructureDescriptor};
use crate::emit::CompiledSpec;
use crate::error::{Error, ErrorKind};
use crate::overlay::OverlayMap;
use crate::util::join_path;
use crate::value::{StructValue, Value};

/// Everything a reconstruction pass needs to see, borrowed from the
/// session's parse call.
pub(crate) struct Reconstructor<'a, 's, 'i> {
    pub converters: &'a ConverterRegistry,
    pub compiled: &'a CompiledSpec,
    pub raw: &'a RawValues<'s, 'i>,

    /// Overlay stack, weakest first.
    pub overlays: &'a [&'a OverlayMap],

    /// Per-instance tokens distributed out of merge-into-list arguments.
    pub merged: &'a HashMap<String, &'i str>,
}

impl Reconstructor<'_, '_, '_> {
    /// Rebuild the instance rooted at `path` from `descriptor`.
    pub fn structure(
        &self,
        descriptor: &StructureDescriptor,
        path: &str,
    ) -> Result<StructValue, Error> {
        let mut instance = StructValue::new(descriptor.name());

        for field in descriptor.fields() {
            if !field.is_init() {
                // the post-construction hook owns this slot
                instance.set(field.name(), Value::None);
                continue;
            }

            let field_path = join_path(path, field.name());

            let value = match field.shape() {
                Shape::Struct(inner) => Value::Struct(self.structure(inner, &field_path)?),

                Shape::Union(union) => {
                    let key = self.compiled.selection(&field_path).ok_or_else(|| {
                        ErrorKind::Reconstruction {
                            path: field_path.clone(),
                            message: "variant selection was never resolved".to_owned(),
                        }
                    })?;

                    let variant = union.variant(key).ok_or_else(|| {
                        ErrorKind::Reconstruction {
                            path: field_path.clone(),
                            message: format!("no variant is registered under '{key}'"),
                        }
                    })?;

                    Value::Struct(self.structure(variant, &field_path)?)
                }

                _ => match self.leaf_value(field, &field_path)? {
                    Some(value) => value,
                    None => {
                        return Err(ErrorKind::MissingRequiredArgument { path: field_path }.into());
                    }
                },
            };

            instance.set(field.name(), value);
        }

        if let Some(hook) = descriptor.post_build() {
            hook(&mut instance).map_err(|message| ErrorKind::Reconstruction {
                path: path.to_owned(),
                message,
            })?;
        }

        Ok(instance)
    }

    /// Resolve a leaf field's value by priority: merged command-line token,
    /// direct command-line value, overlays (strongest first), declared
    /// default. `None` means the field stayed unsatisfied.
    fn leaf_value(
        &self,
        field: &FieldDescriptor,
        path: &str,
    ) -> Result<Option<Value>, Error> {
        if let Some(&token) = self.merged.get(path) {
            return self
                .converters
                .convert_field(field, RawInput::Single(token))
                .map(Some)
                .map_err(|failure| conversion_error(path, failure));
        }

        if let Some(argument) = self.compiled.argument_for(path)
            && argument.merge_paths().is_empty()
            && let Some(raw) = self.raw.get(argument.external())
        {
            return self
                .converters
                .convert_field(field, RawInput::from_raw(raw))
                .map(Some)
                .map_err(|failure| conversion_error(path, failure));
        }

        for overlay in self.overlays.iter().rev() {
            if let Some(value) = overlay.get(path) {
                return self
                    .converters
                    .coerce_field(field, value)
                    .map(Some)
                    .map_err(|failure| conversion_error(path, failure));
            }
        }

        if let Some(value) = field.default().resolve() {
            return Ok(Some(value));
        }

        Ok(match field.shape() {
            Shape::Optional(_) => Some(Value::None),
            _ => None,
        })
    }
}

/// Attach a destination path to a bare conversion failure.
pub(crate) fn conversion_error(path: &str, failure: ConvertFailure) -> Error {
    ErrorKind::ValueConversion {
        path: path.to_owned(),
        raw: failure.raw,
        expected: failure.expected,
        message: failure.message,
    }
    .into()
}
