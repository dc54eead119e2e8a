/*!
The descriptor model: a declarative table describing a structure's fields,
from which the argument surface is compiled and into which parsed values are
reconstructed.

A [`StructureDescriptor`] is an ordered list of [`FieldDescriptor`]s. Each
field carries a [`Shape`] (its declared type), a [`FieldDefault`], and
metadata (help text, external-name override, aliases, choice constraints, a
custom-converter override, and the computed-field flag). Descriptors are
plain data built with the [builder][StructureDescriptor::builder] API — or
supplied wholesale by a [`Describe`] implementation on a user type — and are
validated once, at registration, by [`extract`].
*/

use core::fmt::{self, Debug};
use std::sync::Arc;

use joinery::JoinableIterator;

use crate::convert::ConverterRegistry;
use crate::error::{Error, ErrorKind};
use crate::util::join_path;
use crate::value::{StructValue, Value};

pub use parley_parser::Arity;

/// The declared type of a field, as far as the command line is concerned.
#[derive(Clone)]
pub enum Shape {
    Bool,
    Int,
    Float,
    Str,

    /// A closed, named set of values, converted by exact member-name match.
    Enum(EnumShape),

    /// A value that may be absent. Absence reconstructs as
    /// [`Value::None`]; presence delegates to the inner shape.
    Optional(Box<Shape>),

    /// Exactly `n` values of the inner shape.
    FixedSeq(Box<Shape>, usize),

    /// Any number of values of the inner shape.
    VarSeq(Box<Shape>),

    /// A nested structure; its fields are flattened into the argument
    /// surface under this field's destination path.
    Struct(Arc<StructureDescriptor>),

    /// One of several named structure variants, chosen by a discriminator
    /// key read ahead of the rest of the parse.
    Union(UnionShape),

    /// A type handled by a converter registered under this identity.
    Custom(CustomShape),
}

impl Shape {
    /// Shorthand for an optional wrapping of `inner`.
    #[must_use]
    pub fn optional(inner: Shape) -> Self {
        Shape::Optional(Box::new(inner))
    }

    /// Shorthand for a fixed-length sequence of `inner`.
    #[must_use]
    pub fn fixed_seq(inner: Shape, len: usize) -> Self {
        Shape::FixedSeq(Box::new(inner), len)
    }

    /// Shorthand for a variable-length sequence of `inner`.
    #[must_use]
    pub fn var_seq(inner: Shape) -> Self {
        Shape::VarSeq(Box::new(inner))
    }

    /// How many tokens an argument of this shape consumes.
    pub fn arity(&self) -> Arity {
        match self {
            // `--verbose` with no value means true
            Shape::Bool => Arity::AtMostOne,
            Shape::Int | Shape::Float | Shape::Str => Arity::One,
            Shape::Enum(_) | Shape::Custom(_) => Arity::One,
            Shape::Optional(inner) => inner.arity(),
            Shape::FixedSeq(_, len) => Arity::Exactly(*len),
            Shape::VarSeq(_) => Arity::Remaining,
            // unions are represented by their selector, which takes the key
            Shape::Union(_) => Arity::One,
            Shape::Struct(_) => Arity::One,
        }
    }

    /// The metavariable shown in usage output.
    pub fn placeholder(&self) -> String {
        match self {
            Shape::Bool => "BOOL".to_owned(),
            Shape::Int => "INT".to_owned(),
            Shape::Float => "FLOAT".to_owned(),
            Shape::Str => "STR".to_owned(),
            Shape::Enum(shape) => shape.name.to_uppercase(),
            Shape::Optional(inner) | Shape::FixedSeq(inner, _) | Shape::VarSeq(inner) => {
                inner.placeholder()
            }
            Shape::Struct(descriptor) => descriptor.name().to_uppercase(),
            Shape::Union(_) => "KEY".to_owned(),
            Shape::Custom(shape) => shape.placeholder.to_owned(),
        }
    }

    /// A human rendering of the shape, for error messages.
    pub fn describe(&self) -> String {
        match self {
            Shape::Bool => "bool".to_owned(),
            Shape::Int => "int".to_owned(),
            Shape::Float => "float".to_owned(),
            Shape::Str => "str".to_owned(),
            Shape::Enum(shape) => format!(
                "enum {} ({})",
                shape.name,
                shape.members.iter().join_with("|")
            ),
            Shape::Optional(inner) => format!("optional {}", inner.describe()),
            Shape::FixedSeq(inner, len) => format!("sequence of {len} {}", inner.describe()),
            Shape::VarSeq(inner) => format!("list of {}", inner.describe()),
            Shape::Struct(descriptor) => format!("structure {}", descriptor.name()),
            Shape::Union(shape) => format!(
                "one of {{{}}}",
                shape.variants.iter().map(|(key, _)| key).join_with("|")
            ),
            Shape::Custom(shape) => format!("custom '{}'", shape.id),
        }
    }

    /// The closed token set for this shape, if it has one.
    pub fn choice_tokens(&self) -> Option<Vec<String>> {
        match self {
            Shape::Enum(shape) => Some(shape.members.iter().map(|&m| m.to_owned()).collect()),
            Shape::Union(shape) => Some(
                shape
                    .variants
                    .iter()
                    .map(|&(key, _)| key.to_owned())
                    .collect(),
            ),
            Shape::Optional(inner) => inner.choice_tokens(),
            _ => None,
        }
    }

    /// True for shapes whose value is one command-line token.
    pub(crate) fn is_single_token(&self) -> bool {
        match self {
            Shape::Bool
            | Shape::Int
            | Shape::Float
            | Shape::Str
            | Shape::Enum(_)
            | Shape::Custom(_) => true,
            Shape::Optional(inner) => inner.is_single_token(),
            Shape::FixedSeq(..) | Shape::VarSeq(_) | Shape::Struct(_) | Shape::Union(_) => false,
        }
    }
}

impl Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// A closed, named set of member names.
#[derive(Debug, Clone, Copy)]
pub struct EnumShape {
    pub name: &'static str,
    pub members: &'static [&'static str],
}

impl EnumShape {
    #[must_use]
    pub const fn new(name: &'static str, members: &'static [&'static str]) -> Self {
        Self { name, members }
    }
}

/// The variant table of a union-typed field: discriminator keys bound to
/// structure descriptors, plus the key chosen when the command line stays
/// silent. No default makes the selector a required argument.
#[derive(Clone)]
pub struct UnionShape {
    variants: Vec<(&'static str, Arc<StructureDescriptor>)>,
    default_key: Option<&'static str>,
}

impl UnionShape {
    #[must_use]
    pub fn new(
        variants: impl IntoIterator<Item = (&'static str, Arc<StructureDescriptor>)>,
    ) -> Self {
        Self {
            variants: variants.into_iter().collect(),
            default_key: None,
        }
    }

    #[must_use]
    pub fn with_default(mut self, key: &'static str) -> Self {
        self.default_key = Some(key);
        self
    }

    #[inline]
    pub fn variants(&self) -> &[(&'static str, Arc<StructureDescriptor>)] {
        &self.variants
    }

    #[inline]
    pub fn default_key(&self) -> Option<&'static str> {
        self.default_key
    }

    pub fn variant(&self, key: &str) -> Option<&Arc<StructureDescriptor>> {
        self.variants
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, descriptor)| descriptor)
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.variants.iter().map(|&(key, _)| key)
    }
}

/// A shape handled by a registered custom converter.
#[derive(Debug, Clone, Copy)]
pub struct CustomShape {
    /// Identity the converter was registered under.
    pub id: &'static str,

    /// Metavariable for usage output.
    pub placeholder: &'static str,
}

impl CustomShape {
    #[must_use]
    pub const fn new(id: &'static str) -> Self {
        Self {
            id,
            placeholder: "VALUE",
        }
    }

    #[must_use]
    pub const fn with_placeholder(mut self, placeholder: &'static str) -> Self {
        self.placeholder = placeholder;
        self
    }
}

/// How a field behaves when no value arrives for it.
#[derive(Clone)]
pub enum FieldDefault {
    /// No default; omission is an error.
    Required,

    /// A concrete default value.
    Value(Value),

    /// A zero-argument factory invoked at reconstruction time.
    Factory(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl FieldDefault {
    /// Produce the default value, if there is one.
    pub fn resolve(&self) -> Option<Value> {
        match self {
            FieldDefault::Required => None,
            FieldDefault::Value(value) => Some(value.clone()),
            FieldDefault::Factory(factory) => Some(factory()),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_required(&self) -> bool {
        matches!(self, FieldDefault::Required)
    }
}

impl Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDefault::Required => f.write_str("required"),
            FieldDefault::Value(value) => write!(f, "{value:?}"),
            FieldDefault::Factory(_) => f.write_str("<factory>"),
        }
    }
}

/// One declared field of a structure.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    name: &'static str,
    shape: Shape,
    default: FieldDefault,
    help: Option<String>,
    name_override: Option<String>,
    aliases: Vec<String>,
    choices: Option<Vec<String>>,
    converter: Option<&'static str>,
    init: bool,
}

impl FieldDescriptor {
    /// A new field with no default: it must receive a value from the
    /// command line or an overlay.
    #[must_use]
    pub fn new(name: &'static str, shape: Shape) -> Self {
        Self {
            name,
            shape,
            default: FieldDefault::Required,
            help: None,
            name_override: None,
            aliases: Vec::new(),
            choices: None,
            converter: None,
            init: true,
        }
    }

    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = FieldDefault::Value(value);
        self
    }

    #[must_use]
    pub fn default_with(mut self, factory: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = FieldDefault::Factory(Arc::new(factory));
        self
    }

    #[must_use]
    pub fn help(mut self, text: impl Into<String>) -> Self {
        self.help = Some(text.into());
        self
    }

    /// Pin the external option name, bypassing automatic naming. A pinned
    /// name is never prefixed, and a collision on it is always fatal.
    #[must_use]
    pub fn rename(mut self, name: impl Into<String>) -> Self {
        self.name_override = Some(name.into());
        self
    }

    /// Add an alternate option string for this field.
    #[must_use]
    pub fn alias(mut self, name: impl Into<String>) -> Self {
        self.aliases.push(name.into());
        self
    }

    /// Restrict the accepted tokens to a closed set, without changing the
    /// declared shape.
    #[must_use]
    pub fn choices(mut self, choices: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.choices = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    /// Use the converter registered under `id` instead of the one derived
    /// from the shape.
    #[must_use]
    pub fn converter(mut self, id: &'static str) -> Self {
        self.converter = Some(id);
        self
    }

    /// Mark the field as computed: it gets no argument and no direct
    /// assignment, and is filled in by the structure's post-construction
    /// hook.
    #[must_use]
    pub fn computed(mut self) -> Self {
        self.init = false;
        self
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    #[inline]
    pub fn default(&self) -> &FieldDefault {
        &self.default
    }

    #[inline]
    pub fn help_text(&self) -> Option<&str> {
        self.help.as_deref()
    }

    #[inline]
    pub fn name_override(&self) -> Option<&str> {
        self.name_override.as_deref()
    }

    #[inline]
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    #[inline]
    pub fn choice_constraint(&self) -> Option<&[String]> {
        self.choices.as_deref()
    }

    #[inline]
    pub fn converter_override(&self) -> Option<&'static str> {
        self.converter
    }

    /// False for computed fields.
    #[inline]
    #[must_use]
    pub fn is_init(&self) -> bool {
        self.init
    }

    /// A field is required when it has no declared default. Union fields
    /// are required exactly when their variant table has no default key.
    #[must_use]
    pub fn is_required(&self) -> bool {
        match &self.shape {
            Shape::Union(union) => union.default_key().is_none(),
            Shape::Optional(_) => false,
            _ => self.default.is_required(),
        }
    }
}

/// Hook invoked after a structure's init fields are assigned. Responsible
/// for computed fields and cross-field validation.
pub type PostBuildHook = Arc<dyn Fn(&mut StructValue) -> Result<(), String> + Send + Sync>;

/// An ordered list of field descriptors plus structure-level metadata.
#[derive(Clone)]
pub struct StructureDescriptor {
    name: &'static str,
    doc: Option<String>,
    fields: Vec<FieldDescriptor>,
    post_build: Option<PostBuildHook>,
}

impl StructureDescriptor {
    #[must_use]
    pub fn builder(name: &'static str) -> StructureBuilder {
        StructureBuilder {
            inner: StructureDescriptor {
                name,
                doc: None,
                fields: Vec::new(),
                post_build: None,
            },
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    #[inline]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    #[inline]
    pub(crate) fn post_build(&self) -> Option<&PostBuildHook> {
        self.post_build.as_ref()
    }
}

impl Debug for StructureDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructureDescriptor")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

/// Builder for [`StructureDescriptor`].
pub struct StructureBuilder {
    inner: StructureDescriptor,
}

impl StructureBuilder {
    /// Set the structure's description, shown at the top of usage output
    /// for root registrations.
    #[must_use]
    pub fn doc(mut self, text: impl Into<String>) -> Self {
        self.inner.doc = Some(text.into());
        self
    }

    #[must_use]
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.inner.fields.push(field);
        self
    }

    #[must_use]
    pub fn post_build(
        mut self,
        hook: impl Fn(&mut StructValue) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.inner.post_build = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn build(self) -> Arc<StructureDescriptor> {
        Arc::new(self.inner)
    }
}

/**
A type that can describe itself as a [`StructureDescriptor`]. The
descriptor is an explicit table — typically a builder chain in the
implementation — so no runtime reflection is involved.

Implementations should memoize through a [`OnceLock`][std::sync::OnceLock]
so that every call returns the *same* descriptor allocation: structure
identity is what ties repeated registrations of one type together (the
merge-into-list policy groups registrations by it).

```ignore
impl Describe for Worker {
    fn descriptor() -> Arc<StructureDescriptor> {
        static DESCRIPTOR: OnceLock<Arc<StructureDescriptor>> = OnceLock::new();
        DESCRIPTOR
            .get_or_init(|| {
                StructureDescriptor::builder("Worker")
                    .field(FieldDescriptor::new("threads", Shape::Int))
                    .build()
            })
            .clone()
    }
}
```
*/
pub trait Describe {
    fn descriptor() -> Arc<StructureDescriptor>;
}

/**
Extract and validate the descriptor for a type: the entry point of the
descriptor pipeline. Checks every field shape against the supported set
(consulting `converters` for custom shapes), enforces the union invariant
(every variant is a structure — guaranteed by construction here — with a
valid default key), and rejects structures that contain themselves.
*/
pub fn extract<T: Describe>(
    converters: &ConverterRegistry,
) -> Result<Arc<StructureDescriptor>, Error> {
    let descriptor = T::descriptor();
    validate(&descriptor, descriptor.name(), converters)?;
    Ok(descriptor)
}

/// Validate a descriptor tree rooted at destination `root`.
pub(crate) fn validate(
    descriptor: &Arc<StructureDescriptor>,
    root: &str,
    converters: &ConverterRegistry,
) -> Result<(), Error> {
    let mut stack = Vec::new();
    validate_structure(descriptor, root, converters, &mut stack)
}

fn validate_structure(
    descriptor: &Arc<StructureDescriptor>,
    path: &str,
    converters: &ConverterRegistry,
    stack: &mut Vec<*const StructureDescriptor>,
) -> Result<(), Error> {
    let identity = Arc::as_ptr(descriptor);

    if stack.contains(&identity) {
        return Err(ErrorKind::CyclicStructure {
            path: path.to_owned(),
            structure: descriptor.name().to_owned(),
        }
        .into());
    }

    stack.push(identity);

    for (index, field) in descriptor.fields().iter().enumerate() {
        let field_path = join_path(path, field.name());

        // field names must be unique within their structure
        if descriptor.fields()[..index]
            .iter()
            .any(|other| other.name() == field.name())
        {
            return Err(ErrorKind::ArgumentConflict {
                option: field.name().to_owned(),
                paths: vec![field_path.clone(), field_path],
            }
            .into());
        }

        if !field.is_init() {
            continue;
        }

        validate_shape(field.shape(), field, &field_path, converters, stack)?;
    }

    stack.pop();
    Ok(())
}

fn validate_shape(
    shape: &Shape,
    field: &FieldDescriptor,
    path: &str,
    converters: &ConverterRegistry,
    stack: &mut Vec<*const StructureDescriptor>,
) -> Result<(), Error> {
    let unsupported = |message: &str| -> Error {
        ErrorKind::UnsupportedType {
            path: path.to_owned(),
            declared: shape.describe(),
            message: message.to_owned(),
        }
        .into()
    };

    if let Some(id) = field.converter_override()
        && !converters.is_registered(id)
    {
        return Err(unsupported(&format!("no converter registered as '{id}'")));
    }

    if field.choice_constraint().is_some() && !shape.is_single_token() {
        return Err(unsupported(
            "a choice constraint only applies to single-token fields",
        ));
    }

    match shape {
        Shape::Bool | Shape::Int | Shape::Float | Shape::Str => Ok(()),

        Shape::Enum(members) if members.members.is_empty() => {
            Err(unsupported("enumeration has no members"))
        }
        Shape::Enum(_) => Ok(()),

        Shape::Custom(custom) => match converters.is_registered(custom.id) {
            true => Ok(()),
            false => Err(unsupported(&format!(
                "no converter registered as '{}'",
                custom.id
            ))),
        },

        Shape::Optional(inner) => match inner.as_ref() {
            // nothing on a flat flag surface distinguishes "absent" from
            // "absent because the whole optional structure is absent"
            Shape::Struct(_) | Shape::Union(_) | Shape::Optional(_) => {
                Err(unsupported("optionals cannot wrap structures or unions"))
            }
            inner => validate_shape(inner, field, path, converters, stack),
        },

        Shape::FixedSeq(inner, len) => {
            if *len == 0 {
                return Err(unsupported("zero-length sequence"));
            }
            match inner.is_single_token() {
                true => validate_shape(inner, field, path, converters, stack),
                false => Err(unsupported("sequence items must be single-token values")),
            }
        }

        Shape::VarSeq(inner) => match inner.is_single_token() {
            true => validate_shape(inner, field, path, converters, stack),
            false => Err(unsupported("sequence items must be single-token values")),
        },

        Shape::Struct(descriptor) => validate_structure(descriptor, path, converters, stack),

        Shape::Union(union) => {
            if union.variants().is_empty() {
                return Err(unsupported("union has no variants"));
            }

            if let Some(default) = union.default_key()
                && union.variant(default).is_none()
            {
                return Err(unsupported(&format!(
                    "default key '{default}' is not a declared variant"
                )));
            }

            union
                .variants()
                .iter()
                .try_for_each(|(key, descriptor)| {
                    validate_structure(descriptor, &join_path(path, key), converters, stack)
                })
        }
    }
}
