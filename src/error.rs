/*!
The error taxonomy for descriptor compilation, parsing, and reconstruction.

Two families live here. Definition-time errors ([`UnsupportedType`],
[`CyclicStructure`], [`ArgumentConflict`], [`DuplicateDestination`]) mean the
structure definitions themselves are wrong; they abort compilation and no
amount of different input fixes them. Input-time errors
([`MissingRequiredArgument`], [`ValueConversion`], [`Reconstruction`],
[`TokenSyntax`], [`Overlay`]) mean the user gave us something we couldn't
use, and carry the offending destination path and raw input so the message
can point at it.

[`UnsupportedType`]: ErrorKind::UnsupportedType
[`CyclicStructure`]: ErrorKind::CyclicStructure
[`ArgumentConflict`]: ErrorKind::ArgumentConflict
[`DuplicateDestination`]: ErrorKind::DuplicateDestination
[`MissingRequiredArgument`]: ErrorKind::MissingRequiredArgument
[`ValueConversion`]: ErrorKind::ValueConversion
[`Reconstruction`]: ErrorKind::Reconstruction
[`TokenSyntax`]: ErrorKind::TokenSyntax
[`Overlay`]: ErrorKind::Overlay
*/

use core::fmt::{self, Display};
use std::error;

use joinery::JoinableIterator;
use lazy_format::lazy_format;

pub use parley_parser::TokenSyntaxError;

/// Error type for every fallible operation in [`parley`][crate].
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    /// Returns a reference to the error kind for detailed inspection.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// True for errors that indicate a mistake in the structure definitions
    /// rather than in the incoming arguments. These abort compilation and
    /// should be treated as bugs in the calling program.
    #[must_use]
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::UnsupportedType { .. }
                | ErrorKind::CyclicStructure { .. }
                | ErrorKind::ArgumentConflict { .. }
                | ErrorKind::DuplicateDestination { .. }
        )
    }

    /// True when the error is a request for a usage message rather than a
    /// real failure.
    #[must_use]
    pub fn is_help_request(&self) -> bool {
        matches!(self.kind, ErrorKind::HelpRequested)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = &self.kind;
        write!(f, "{kind}")
    }
}

impl error::Error for Error {}

impl<K: Into<ErrorKind>> From<K> for Error {
    fn from(value: K) -> Self {
        let kind = value.into();
        Error { kind }
    }
}

/// Detailed classification of errors.
#[derive(Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A field's declared shape can't be mapped to any command-line surface
    /// and no custom converter is registered for it.
    UnsupportedType {
        /// Destination path of the offending field.
        path: String,

        /// Human-readable rendering of the declared shape.
        declared: String,

        /// What specifically was wrong with it.
        message: String,
    },

    /// A structure contains itself as a field, directly or through
    /// intermediate structures. No finite set of flags can represent it.
    CyclicStructure {
        /// Destination path at which the cycle closed.
        path: String,

        /// Name of the structure that recurred.
        structure: String,
    },

    /// Two or more fields resolved to the same external option name and the
    /// active policy refused to (or could not) disambiguate them.
    ArgumentConflict {
        /// The contested option name.
        option: String,

        /// Destination paths of every field claiming the name.
        paths: Vec<String>,
    },

    /// The same destination path was registered twice in one session.
    DuplicateDestination { path: String },

    /// A required field had no value after layering every default source.
    MissingRequiredArgument {
        /// Destination path of the unsatisfied field.
        path: String,
    },

    /// A raw value failed to convert into the field's declared shape.
    ValueConversion {
        /// Destination path of the field being converted.
        path: String,

        /// The raw input, as it appeared on the command line or in an
        /// overlay file.
        raw: String,

        /// Rendering of the shape the field expected.
        expected: String,

        /// What specifically went wrong.
        message: String,
    },

    /// Rebuilding the structure instance failed after parsing succeeded,
    /// for instance in a post-construction hook.
    Reconstruction { path: String, message: String },

    /// A defaults overlay file could not be read or understood.
    Overlay {
        /// The file (or other source label) that failed.
        source: String,
        message: String,
    },

    /// Passthrough from the low-level tokenizer.
    TokenSyntax(TokenSyntaxError),

    /// The user asked for the usage message.
    HelpRequested,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::UnsupportedType {
                path,
                declared,
                message,
            } => {
                write!(f, "field '{path}': unsupported type {declared}: {message}")
            }
            ErrorKind::CyclicStructure { path, structure } => write!(
                f,
                "field '{path}': structure '{structure}' contains itself; \
                 a cyclic structure has no finite command-line form"
            ),
            ErrorKind::ArgumentConflict { option, paths } => write!(
                f,
                "option --{option} is claimed by multiple fields: {paths}",
                paths = paths
                    .iter()
                    .map(|path| lazy_format!("'{path}'"))
                    .join_with(", "),
            ),
            ErrorKind::DuplicateDestination { path } => {
                write!(f, "destination '{path}' was registered more than once")
            }
            ErrorKind::MissingRequiredArgument { path } => {
                write!(f, "field '{path}' is required and got no value")
            }
            ErrorKind::ValueConversion {
                path,
                raw,
                expected,
                message,
            } => write!(
                f,
                "field '{path}': failed to parse {raw:?} as {expected}: {message}"
            ),
            ErrorKind::Reconstruction { path, message } => {
                write!(f, "failed to reconstruct '{path}': {message}")
            }
            ErrorKind::Overlay { source, message } => {
                write!(f, "defaults overlay {source}: {message}")
            }
            ErrorKind::TokenSyntax(error) => write!(f, "{error}"),
            ErrorKind::HelpRequested => write!(f, "usage message was requested"),
        }
    }
}

impl From<TokenSyntaxError> for ErrorKind {
    fn from(error: TokenSyntaxError) -> Self {
        ErrorKind::TokenSyntax(error)
    }
}
