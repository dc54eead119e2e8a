/*!
Defaults overlays: external mappings that supply default values beneath the
command line.

An overlay file is a JSON or TOML document keyed by destination path, in
either dotted or nested-mapping form (or a mix — `{"train.a": 5}` and
`{"train": {"a": 5}}` load identically). Loading normalizes everything to a
flat dotted-path → [`Value`] map; layering order is the reconstructor's
business, not this module's.
*/

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{Error, ErrorKind};
use crate::util::join_path;
use crate::value::Value;

/// A loaded overlay: leaf values keyed by dotted destination path.
#[derive(Debug, Clone, Default)]
pub struct OverlayMap {
    source: String,
    entries: HashMap<String, Value>,
}

impl OverlayMap {
    /// An empty overlay, useful as a programmatic default-override map.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            entries: HashMap::new(),
        }
    }

    /// Load an overlay from a file, dispatching on its extension: `.toml`
    /// parses as TOML, everything else as JSON.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let source = path.display().to_string();

        let text = fs::read_to_string(path).map_err(|error| ErrorKind::Overlay {
            source: source.clone(),
            message: error.to_string(),
        })?;

        match path.extension().is_some_and(|ext| ext == "toml") {
            true => Self::from_toml_str(source, &text),
            false => Self::from_json_str(source, &text),
        }
    }

    /// Load an overlay from JSON text.
    pub fn from_json_str(source: impl Into<String>, text: &str) -> Result<Self, Error> {
        let source = source.into();

        let document: serde_json::Value =
            serde_json::from_str(text).map_err(|error| ErrorKind::Overlay {
                source: source.clone(),
                message: error.to_string(),
            })?;

        let serde_json::Value::Object(root) = document else {
            return Err(ErrorKind::Overlay {
                source,
                message: "overlay document must be a mapping".to_owned(),
            }
            .into());
        };

        let mut overlay = Self::new(source);
        for (key, value) in root {
            overlay.flatten_json(&key, value)?;
        }
        Ok(overlay)
    }

    /// Load an overlay from TOML text.
    pub fn from_toml_str(source: impl Into<String>, text: &str) -> Result<Self, Error> {
        let source = source.into();

        let document: toml::Value = text.parse().map_err(|error: toml::de::Error| {
            ErrorKind::Overlay {
                source: source.clone(),
                message: error.to_string(),
            }
        })?;

        let toml::Value::Table(root) = document else {
            return Err(ErrorKind::Overlay {
                source,
                message: "overlay document must be a table".to_owned(),
            }
            .into());
        };

        let mut overlay = Self::new(source);
        for (key, value) in root {
            overlay.flatten_toml(&key, value)?;
        }
        Ok(overlay)
    }

    /// Set a single entry. Used for programmatic default-override maps.
    pub fn set(&mut self, path: impl Into<String>, value: Value) {
        self.entries.insert(path.into(), value);
    }

    /// Rebase every key under `prefix`. Registration-time default
    /// overrides are written relative to their structure and rebased onto
    /// the registration's destination path.
    pub(crate) fn prefixed(self, prefix: &str) -> Self {
        Self {
            source: self.source,
            entries: self
                .entries
                .into_iter()
                .map(|(path, value)| (join_path(prefix, &path), value))
                .collect(),
        }
    }

    #[inline]
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.entries.get(path)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn unsupported(&self, path: &str, what: &str) -> Error {
        ErrorKind::Overlay {
            source: self.source.clone(),
            message: format!("unsupported value for '{path}': {what}"),
        }
        .into()
    }

    fn flatten_json(&mut self, path: &str, value: serde_json::Value) -> Result<(), Error> {
        match value {
            serde_json::Value::Object(object) => object
                .into_iter()
                .try_for_each(|(key, value)| self.flatten_json(&join_path(path, &key), value)),
            leaf => {
                let value = self.json_leaf(path, leaf)?;
                self.entries.insert(path.to_owned(), value);
                Ok(())
            }
        }
    }

    fn json_leaf(&self, path: &str, value: serde_json::Value) -> Result<Value, Error> {
        match value {
            serde_json::Value::Null => Ok(Value::None),
            serde_json::Value::Bool(value) => Ok(Value::Bool(value)),
            serde_json::Value::Number(number) => match number.as_i64() {
                Some(value) => Ok(Value::Int(value)),
                None => number
                    .as_f64()
                    .map(Value::Float)
                    .ok_or_else(|| self.unsupported(path, "number out of range")),
            },
            serde_json::Value::String(value) => Ok(Value::Str(value)),
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    serde_json::Value::Object(_) => {
                        Err(self.unsupported(path, "mapping inside a list"))
                    }
                    item => self.json_leaf(path, item),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            serde_json::Value::Object(_) => unreachable!("objects are flattened by the caller"),
        }
    }

    fn flatten_toml(&mut self, path: &str, value: toml::Value) -> Result<(), Error> {
        match value {
            toml::Value::Table(table) => table
                .into_iter()
                .try_for_each(|(key, value)| self.flatten_toml(&join_path(path, &key), value)),
            leaf => {
                let value = self.toml_leaf(path, leaf)?;
                self.entries.insert(path.to_owned(), value);
                Ok(())
            }
        }
    }

    fn toml_leaf(&self, path: &str, value: toml::Value) -> Result<Value, Error> {
        match value {
            toml::Value::Boolean(value) => Ok(Value::Bool(value)),
            toml::Value::Integer(value) => Ok(Value::Int(value)),
            toml::Value::Float(value) => Ok(Value::Float(value)),
            toml::Value::String(value) => Ok(Value::Str(value)),
            toml::Value::Datetime(value) => Ok(Value::Str(value.to_string())),
            toml::Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    toml::Value::Table(_) => Err(self.unsupported(path, "table inside a list")),
                    item => self.toml_leaf(path, item),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            toml::Value::Table(_) => unreachable!("tables are flattened by the caller"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn nested_and_dotted_keys_load_identically() {
        let nested =
            OverlayMap::from_json_str("<nested>", r#"{"train": {"a": 5, "b": true}}"#).unwrap();
        let dotted =
            OverlayMap::from_json_str("<dotted>", r#"{"train.a": 5, "train.b": true}"#).unwrap();

        for overlay in [&nested, &dotted] {
            assert_eq!(overlay.get("train.a"), Some(&Value::Int(5)));
            assert_eq!(overlay.get("train.b"), Some(&Value::Bool(true)));
        }
    }

    #[test]
    fn toml_tables_flatten() {
        let text = indoc! {r#"
            [train]
            a = 5
            rate = 0.5
            name = "model"
        "#};
        let overlay = OverlayMap::from_toml_str("<toml>", text).unwrap();

        assert_eq!(overlay.get("train.a"), Some(&Value::Int(5)));
        assert_eq!(overlay.get("train.rate"), Some(&Value::Float(0.5)));
        assert_eq!(
            overlay.get("train.name"),
            Some(&Value::Str("model".to_owned()))
        );
    }

    #[test]
    fn lists_load_as_list_values() {
        let overlay = OverlayMap::from_json_str("<inline>", r#"{"sizes": [1, 2, 3]}"#).unwrap();

        assert_eq!(
            overlay.get("sizes"),
            Some(&Value::List(vec![
                Value::Int(1),
                Value::Int(2),
                Value::Int(3)
            ]))
        );
    }

    #[test]
    fn malformed_documents_are_overlay_errors() {
        let error = OverlayMap::from_json_str("<bad>", "[1, 2]").unwrap_err();
        assert!(matches!(
            error.kind(),
            crate::ErrorKind::Overlay { .. }
        ));
    }
}
