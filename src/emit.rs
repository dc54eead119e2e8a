/*!
The argument-spec emitter: flattens the registered descriptor trees into the
external option surface.

Emission is a pure function of the registrations, the naming policy, and the
current variant selections; the session re-runs it freely (once per selector
round, then once for the final surface) and two runs over the same inputs
produce identical results.

Union-typed fields contribute two kinds of output. The selector itself
becomes a discrete-choice argument, and the fields of the *currently
selected* variant are flattened beneath the union field's destination path.
Fields of the variants that were not chosen become discard specs: the
tokenizer consumes their tokens and drops them, so choosing variant `b` and
passing a flag that only variant `a` has is not an error.
*/

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::descriptor::{FieldDescriptor, Shape, StructureDescriptor};
use crate::error::{Error, ErrorKind};
use crate::naming::{ConflictPolicy, NameEntry, resolve_names};
use crate::session::{HelpProvider, Registration};
use crate::util::join_path;
use crate::value::Value;

pub use parley_parser::Arity;

/// The external-facing unit: one command-line option, fully resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedArgument {
    pub(crate) external: String,
    pub(crate) aliases: Vec<String>,
    pub(crate) arity: Arity,
    pub(crate) path: String,
    pub(crate) merge_paths: Vec<String>,
    pub(crate) required: bool,
    pub(crate) default: Option<Value>,
    pub(crate) help: Option<String>,
    pub(crate) choices: Option<Vec<String>>,
    pub(crate) placeholder: String,
    pub(crate) selector: bool,
    pub(crate) builtin: bool,
}

impl ResolvedArgument {
    /// The primary external name, without leading dashes.
    #[inline]
    #[must_use]
    pub fn external(&self) -> &str {
        &self.external
    }

    /// Alternate names, without leading dashes.
    #[inline]
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    #[inline]
    pub fn arity(&self) -> Arity {
        self.arity
    }

    /// Destination path of the field this option fills. For a merged
    /// option this is the first instance's path; see
    /// [`merge_paths`][Self::merge_paths].
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// For a merge-into-list option, every instance path it fills, in
    /// registration order. Empty otherwise.
    #[inline]
    pub fn merge_paths(&self) -> &[String] {
        &self.merge_paths
    }

    #[inline]
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// The declared default, rendered for usage output.
    #[inline]
    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    #[inline]
    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    /// The closed token set, for enumerations, constrained fields, and
    /// variant selectors.
    #[inline]
    pub fn choices(&self) -> Option<&[String]> {
        self.choices.as_deref()
    }

    #[inline]
    #[must_use]
    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// True for the discriminator option of a union-typed field.
    #[inline]
    #[must_use]
    pub fn is_selector(&self) -> bool {
        self.selector
    }

    /// True for session-provided options like `--help`.
    #[inline]
    #[must_use]
    pub fn is_builtin(&self) -> bool {
        self.builtin
    }
}

/// An option that is recognized and consumed but never recorded: the
/// surface of the variants that were not selected.
#[derive(Debug, Clone)]
pub(crate) struct DiscardSpec {
    pub names: Vec<String>,
    pub arity: Arity,
}

/// The output of one emission pass.
#[derive(Debug, Clone)]
pub struct CompiledSpec {
    pub(crate) arguments: Vec<ResolvedArgument>,
    pub(crate) discards: Vec<DiscardSpec>,

    /// Destination path → index into `arguments`. Merged options appear
    /// once per instance path.
    pub(crate) names: HashMap<String, usize>,

    /// Union field path → chosen variant key.
    pub(crate) selections: HashMap<String, String>,
}

impl CompiledSpec {
    /// Every externally visible argument, built-ins included. Discard
    /// specs are not part of the emitted surface.
    #[inline]
    pub fn arguments(&self) -> &[ResolvedArgument] {
        &self.arguments
    }

    /// The variant key chosen for each union-typed field.
    pub fn selection(&self, path: &str) -> Option<&str> {
        self.selections.get(path).map(String::as_str)
    }

    pub(crate) fn argument_for(&self, path: &str) -> Option<&ResolvedArgument> {
        self.names.get(path).map(|&index| &self.arguments[index])
    }
}

/// One leaf of the flattened registration tree: a field that becomes an
/// argument.
struct FlatField<'a> {
    registration: usize,
    owner: &'a StructureDescriptor,
    parent: String,
    path: String,
    field: &'a FieldDescriptor,
    selector: bool,
    merge_paths: Vec<String>,
}

/// Run one full emission pass over the registrations.
pub(crate) fn compile_spec(
    registrations: &[Registration],
    policy: ConflictPolicy,
    selections: &HashMap<String, String>,
    builtins: &[ResolvedArgument],
    help: Option<&HelpProvider>,
) -> Result<CompiledSpec, Error> {
    let mut fields = Vec::new();
    flatten_registrations(registrations, policy, selections, &mut fields)?;

    debug!(
        "emitting {count} arguments across {registrations} registrations",
        count = fields.len(),
        registrations = registrations.len(),
    );

    // built-ins participate in conflict detection as immovable claims
    let mut entries: Vec<NameEntry> = builtins
        .iter()
        .map(|builtin| {
            NameEntry::new(
                usize::MAX,
                format!("<built-in --{}>", builtin.external),
                String::new(),
                builtin.external.clone(),
                true,
                builtin.aliases.clone(),
            )
        })
        .collect();

    for flat in &fields {
        let (bare, pinned) = match flat.field.name_override() {
            Some(name) => (name.trim_start_matches('-').to_owned(), true),
            None => (flat.field.name().to_owned(), false),
        };

        entries.push(NameEntry::new(
            flat.registration,
            flat.path.clone(),
            flat.parent.clone(),
            bare,
            pinned,
            flat.field
                .aliases()
                .iter()
                .map(|alias| alias.trim_start_matches('-').to_owned())
                .collect(),
        ));
    }

    resolve_names(&mut entries, policy)?;

    let mut arguments: Vec<ResolvedArgument> = builtins.to_vec();
    let mut names = HashMap::new();

    for (flat, entry) in fields.iter().zip(&entries[builtins.len()..]) {
        let index = arguments.len();

        for path in &flat.merge_paths {
            names.insert(path.clone(), index);
        }
        names.insert(flat.path.clone(), index);

        arguments.push(resolve_argument(flat, entry.external(), help));
    }

    let mut discards = Vec::new();
    collect_discards(registrations, selections, &mut discards);

    // selectors answer to their fully prefixed spelling during the early
    // scan rounds; keep that spelling consumable in the strict pass too
    for argument in &arguments {
        if argument.selector && argument.path != argument.external {
            discards.push(DiscardSpec {
                names: vec![argument.path.clone()],
                arity: Arity::One,
            });
        }
    }

    Ok(CompiledSpec {
        arguments,
        discards,
        names,
        selections: selections.clone(),
    })
}

fn resolve_argument(
    flat: &FlatField<'_>,
    external: String,
    help: Option<&HelpProvider>,
) -> ResolvedArgument {
    let field = flat.field;
    let merged = flat.merge_paths.len() > 1;

    let (arity, default, choices, placeholder, required) = match field.shape() {
        Shape::Union(union) => (
            Arity::One,
            union.default_key().map(|key| Value::Str(key.to_owned())),
            Some(union.keys().map(str::to_owned).collect()),
            field.shape().placeholder(),
            union.default_key().is_none(),
        ),
        shape => (
            if merged { Arity::Remaining } else { shape.arity() },
            field
                .default()
                .resolve()
                .or_else(|| matches!(shape, Shape::Optional(_)).then_some(Value::None)),
            field
                .choice_constraint()
                .map(|choices| choices.to_vec())
                .or_else(|| shape.choice_tokens()),
            shape.placeholder(),
            field.is_required(),
        ),
    };

    let help_text = field
        .help_text()
        .map(str::to_owned)
        .or_else(|| help.and_then(|provider| provider(flat.owner.name(), field.name())));

    ResolvedArgument {
        external,
        aliases: flat
            .field
            .aliases()
            .iter()
            .map(|alias| alias.trim_start_matches('-').to_owned())
            .collect(),
        arity,
        path: flat.path.clone(),
        merge_paths: if merged { flat.merge_paths.clone() } else { Vec::new() },
        required,
        default,
        help: help_text,
        choices,
        placeholder,
        selector: flat.selector,
        builtin: false,
    }
}

fn flatten_registrations<'a>(
    registrations: &'a [Registration],
    policy: ConflictPolicy,
    selections: &HashMap<String, String>,
    out: &mut Vec<FlatField<'a>>,
) -> Result<(), Error> {
    if policy != ConflictPolicy::MergeIntoList {
        for (index, registration) in registrations.iter().enumerate() {
            flatten_structure(
                &registration.descriptor,
                index,
                &registration.dest,
                &[registration.dest.clone()],
                selections,
                out,
            )?;
        }
        return Ok(());
    }

    // merge-into-list: registrations of the same structure type collapse
    // into one spec set, one value per instance
    let mut grouped: Vec<(*const StructureDescriptor, Vec<usize>)> = Vec::new();

    for (index, registration) in registrations.iter().enumerate() {
        let identity = Arc::as_ptr(&registration.descriptor);
        match grouped.iter_mut().find(|(ptr, _)| *ptr == identity) {
            Some((_, members)) => members.push(index),
            None => grouped.push((identity, vec![index])),
        }
    }

    for (_, members) in grouped {
        let first = &registrations[members[0]];
        let dests: Vec<String> = members
            .iter()
            .map(|&index| registrations[index].dest.clone())
            .collect();

        if dests.len() > 1 {
            debug!(
                "merging {count} registrations of '{name}' into list-valued arguments",
                count = dests.len(),
                name = first.descriptor.name(),
            );
        }

        flatten_structure(
            &first.descriptor,
            members[0],
            &first.dest,
            &dests,
            selections,
            out,
        )?;
    }

    Ok(())
}

fn flatten_structure<'a>(
    descriptor: &'a Arc<StructureDescriptor>,
    registration: usize,
    parent: &str,
    instances: &[String],
    selections: &HashMap<String, String>,
    out: &mut Vec<FlatField<'a>>,
) -> Result<(), Error> {
    let merged = instances.len() > 1;

    for field in descriptor.fields() {
        if !field.is_init() {
            continue;
        }

        let path = join_path(parent, field.name());
        let instance_paths: Vec<String> = instances
            .iter()
            .map(|instance| join_path(instance, field.name()))
            .collect();

        match field.shape() {
            Shape::Struct(inner) => {
                flatten_structure(inner, registration, &path, &instance_paths, selections, out)?;
            }

            Shape::Union(union) => {
                if merged {
                    return Err(ErrorKind::UnsupportedType {
                        path,
                        declared: field.shape().describe(),
                        message: "merge-into-list cannot merge variant fields".to_owned(),
                    }
                    .into());
                }

                out.push(FlatField {
                    registration,
                    owner: descriptor.as_ref(),
                    parent: parent.to_owned(),
                    path: path.clone(),
                    field,
                    selector: true,
                    merge_paths: instance_paths,
                });

                if let Some(key) = selections.get(&path) {
                    let variant = union
                        .variant(key)
                        .expect("selections hold validated variant keys");
                    flatten_structure(
                        variant,
                        registration,
                        &path,
                        &[path.clone()],
                        selections,
                        out,
                    )?;
                }
            }

            shape => {
                if merged && !shape.is_single_token() {
                    return Err(ErrorKind::UnsupportedType {
                        path,
                        declared: shape.describe(),
                        message: "merge-into-list requires single-token fields".to_owned(),
                    }
                    .into());
                }

                out.push(FlatField {
                    registration,
                    owner: descriptor.as_ref(),
                    parent: parent.to_owned(),
                    path,
                    field,
                    selector: false,
                    merge_paths: instance_paths,
                });
            }
        }
    }

    Ok(())
}

/// Collect the consumable-but-ignored surface: every field of every variant
/// that was *not* selected, under both its bare name and its full path.
fn collect_discards(
    registrations: &[Registration],
    selections: &HashMap<String, String>,
    out: &mut Vec<DiscardSpec>,
) {
    for registration in registrations {
        discards_in_structure(&registration.descriptor, &registration.dest, selections, out);
    }
}

fn discards_in_structure(
    descriptor: &StructureDescriptor,
    parent: &str,
    selections: &HashMap<String, String>,
    out: &mut Vec<DiscardSpec>,
) {
    for field in descriptor.fields() {
        if !field.is_init() {
            continue;
        }

        let path = join_path(parent, field.name());

        match field.shape() {
            Shape::Struct(inner) => discards_in_structure(inner, &path, selections, out),
            Shape::Union(union) => {
                let selected = selections.get(&path).map(String::as_str);

                for &(key, ref variant) in union.variants() {
                    if selected != Some(key) {
                        discard_whole_structure(variant, &path, out);
                    }
                }

                // the chosen variant may itself contain unions
                if let Some(key) = selected
                    && let Some(variant) = union.variant(key)
                {
                    discards_in_structure(variant, &path, selections, out);
                }
            }
            _ => {}
        }
    }
}

/// Add every field of `descriptor` (and everything below it, all variants
/// included) as a discard spec.
fn discard_whole_structure(descriptor: &StructureDescriptor, parent: &str, out: &mut Vec<DiscardSpec>) {
    for field in descriptor.fields() {
        if !field.is_init() {
            continue;
        }

        let path = join_path(parent, field.name());

        match field.shape() {
            Shape::Struct(inner) => discard_whole_structure(inner, &path, out),
            Shape::Union(union) => {
                out.push(discard_spec(field, &path, Arity::One));
                for (_, variant) in union.variants() {
                    discard_whole_structure(variant, &path, out);
                }
            }
            shape => out.push(discard_spec(field, &path, shape.arity())),
        }
    }
}

fn discard_spec(field: &FieldDescriptor, path: &str, arity: Arity) -> DiscardSpec {
    let bare = field
        .name_override()
        .map(|name| name.trim_start_matches('-').to_owned())
        .unwrap_or_else(|| field.name().to_owned());

    let mut names = vec![bare, path.to_owned()];
    names.extend(
        field
            .aliases()
            .iter()
            .map(|alias| alias.trim_start_matches('-').to_owned()),
    );

    DiscardSpec {
        names,
        arity,
    }
}
