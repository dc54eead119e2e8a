/*!
The parser session: the public entry point that ties extraction, naming,
emission, tokenizing, and reconstruction together.

A session is built once, structures are registered under destination paths,
and then [`parse`][Session::parse] runs the whole compile → tokenize →
reconstruct cycle in one synchronous call. Nothing in the session mutates
during a parse; compilation is re-run from scratch on every call, so
registering more structures between parses is safe and two parses of the
same input produce the same result.

Variant selectors force a staged compile: the full option surface isn't
known until every union-typed field has a chosen variant, and the choice
can come from the command line itself. [`parse`][Session::parse] therefore
runs lenient pre-scans — selector rounds — growing the surface one level of
nesting at a time, before the single strict tokenizing pass.
*/

use std::collections::{HashMap, HashSet};
use std::io::{self, Write as _};
use std::sync::Arc;

use log::debug;
use parley_parser::{OptionSpec, RawValue, scan_known, tokenize};

use crate::convert::ConverterRegistry;
use crate::descriptor::{Describe, StructureDescriptor, validate};
use crate::emit::{Arity, CompiledSpec, ResolvedArgument, compile_spec};
use crate::error::{Error, ErrorKind};
use crate::help;
use crate::naming::ConflictPolicy;
use crate::overlay::OverlayMap;
use crate::reconstruct::Reconstructor;
use crate::value::{FromStructure, StructValue, Value};

/// The built-in option that prints the usage message.
pub const HELP_OPTION: &str = "help";

/// The built-in option that loads overlay files from the command line.
pub const DEFAULTS_OPTION: &str = "defaults";

// matches the namer's round cap; selector nesting deeper than this is
// pathological
const MAX_SELECTOR_ROUNDS: usize = 50;

/// Callback supplying help text for fields that declared none, keyed by
/// structure name and field name. This is the hook where doc-comment
/// extraction plugs in.
pub type HelpProvider = Arc<dyn Fn(&str, &str) -> Option<String> + Send + Sync>;

/// One registered structure: the descriptor, its destination path, and the
/// optional registration-time default override (already rebased onto the
/// destination).
pub(crate) struct Registration {
    pub descriptor: Arc<StructureDescriptor>,
    pub dest: String,
    pub default_override: Option<OverlayMap>,
}

/// A configured parser session. See the [module docs][self].
pub struct Session {
    command: String,
    description: Option<String>,
    policy: ConflictPolicy,
    converters: ConverterRegistry,
    registrations: Vec<Registration>,
    overlays: Vec<OverlayMap>,
    defaults_option: bool,
    help_provider: Option<HelpProvider>,
}

impl Session {
    /// A new session for the program named `command` (used in the usage
    /// synopsis), with the default prefix-on-conflict naming policy.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            description: None,
            policy: ConflictPolicy::default(),
            converters: ConverterRegistry::new(),
            registrations: Vec::new(),
            overlays: Vec::new(),
            defaults_option: true,
            help_provider: None,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the program description shown at the top of the usage message.
    #[must_use]
    pub fn with_description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Install a fallback source of per-field help text.
    #[must_use]
    pub fn with_help_provider(
        mut self,
        provider: impl Fn(&str, &str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.help_provider = Some(Arc::new(provider));
        self
    }

    /// Drop the built-in `--defaults` option; overlay files can then only
    /// be supplied at registration time.
    #[must_use]
    pub fn without_defaults_option(mut self) -> Self {
        self.defaults_option = false;
        self
    }

    /// The session's converter registry, for registering custom
    /// converters.
    pub fn converters(&mut self) -> &mut ConverterRegistry {
        &mut self.converters
    }

    /// Register a type under a destination path.
    pub fn register<T: Describe>(&mut self, dest: impl Into<String>) -> Result<(), Error> {
        self.register_descriptor(T::descriptor(), dest, None)
    }

    /// Register a type with a default-override map whose keys are relative
    /// to the structure (so `"lr"` overrides `<dest>.lr`).
    pub fn register_with_defaults<T: Describe>(
        &mut self,
        dest: impl Into<String>,
        defaults: OverlayMap,
    ) -> Result<(), Error> {
        self.register_descriptor(T::descriptor(), dest, Some(defaults))
    }

    /// Register an explicit descriptor. This is where extraction-time
    /// validation happens: unsupported shapes, cyclic structures, and bad
    /// variant tables are rejected here, before any parsing.
    pub fn register_descriptor(
        &mut self,
        descriptor: Arc<StructureDescriptor>,
        dest: impl Into<String>,
        default_override: Option<OverlayMap>,
    ) -> Result<(), Error> {
        let dest = dest.into();

        if self
            .registrations
            .iter()
            .any(|registration| registration.dest == dest)
        {
            return Err(ErrorKind::DuplicateDestination { path: dest }.into());
        }

        validate(&descriptor, &dest, &self.converters)?;

        debug!(
            "registered '{name}' at destination '{dest}'",
            name = descriptor.name(),
        );

        self.registrations.push(Registration {
            default_override: default_override.map(|overlay| overlay.prefixed(&dest)),
            descriptor,
            dest,
        });

        Ok(())
    }

    /// Load a registration-time overlay file. Files layer in load order,
    /// later files winning, all of them beneath any `--defaults` files and
    /// the command line itself.
    pub fn load_defaults(&mut self, path: impl AsRef<std::path::Path>) -> Result<(), Error> {
        let overlay = OverlayMap::from_path(path)?;
        self.overlays.push(overlay);
        Ok(())
    }

    /// Add a programmatic overlay at the registration-time layer.
    pub fn add_defaults(&mut self, overlay: OverlayMap) {
        self.overlays.push(overlay);
    }

    /// Compile the current registrations against a token stream, without
    /// parsing. The result is a fresh, read-only view; compiling twice
    /// without mutating the session yields identical results.
    pub fn compile(&self, tokens: &[String]) -> Result<CompiledSpec, Error> {
        self.compile_internal(tokens, false)
            .map(|(compiled, _)| compiled)
    }

    /**
    Run the full cycle: resolve variant selectors, tokenize strictly,
    convert, overlay defaults, and reconstruct one instance per registered
    destination.

    Fails with the structured [`Error`]; as a command-line front end,
    prefer [`parse_or_exit`][Session::parse_or_exit], which turns failures
    into a usage message and a non-zero exit.
    */
    pub fn parse(&self, tokens: &[String]) -> Result<Parsed, Error> {
        // --help anywhere wins, even next to invalid arguments
        if self.help_requested(tokens) {
            return Err(ErrorKind::HelpRequested.into());
        }

        let (compiled, cli_overlays) = self.compile_internal(tokens, false)?;
        let overlays = self.overlay_stack(&cli_overlays);

        let alias_refs: Vec<Vec<&str>> = compiled
            .arguments
            .iter()
            .map(|argument| argument.aliases.iter().map(String::as_str).collect())
            .collect();
        let specs: Vec<OptionSpec<'_>> = compiled
            .arguments
            .iter()
            .zip(&alias_refs)
            .map(|(argument, aliases)| OptionSpec {
                name: argument.external.as_str(),
                aliases: aliases.as_slice(),
                arity: argument.arity,
            })
            .collect();

        let shadow_alias_refs: Vec<Vec<&str>> = compiled
            .discards
            .iter()
            .map(|discard| discard.names[1..].iter().map(String::as_str).collect())
            .collect();
        let shadows: Vec<OptionSpec<'_>> = compiled
            .discards
            .iter()
            .zip(&shadow_alias_refs)
            .map(|(discard, aliases)| OptionSpec {
                name: discard.names[0].as_str(),
                aliases: aliases.as_slice(),
                arity: discard.arity,
            })
            .collect();

        let raw = tokenize(&specs, &shadows, tokens).map_err(ErrorKind::from)?;

        // distribute merge-into-list values: one token broadcasts, N tokens
        // fill the N instances in registration order
        let mut merged: HashMap<String, &str> = HashMap::new();
        for argument in &compiled.arguments {
            let paths = argument.merge_paths();
            if paths.is_empty() {
                continue;
            }

            let Some(value) = raw.get(&argument.external) else {
                continue;
            };
            let values = value.tokens();

            if values.len() == 1 {
                for path in paths {
                    merged.insert(path.clone(), values[0]);
                }
            } else if values.len() == paths.len() {
                for (path, &value) in paths.iter().zip(values) {
                    merged.insert(path.clone(), value);
                }
            } else {
                return Err(ErrorKind::ValueConversion {
                    path: argument.path.clone(),
                    raw: values.join(" "),
                    expected: format!("1 or {count} values", count = paths.len()),
                    message: format!(
                        "{count} registrations share --{name}",
                        count = paths.len(),
                        name = argument.external,
                    ),
                }
                .into());
            }
        }

        let reconstructor = Reconstructor {
            converters: &self.converters,
            compiled: &compiled,
            raw: &raw,
            overlays: &overlays,
            merged: &merged,
        };

        let mut instances = HashMap::new();
        for registration in &self.registrations {
            let instance =
                reconstructor.structure(&registration.descriptor, &registration.dest)?;
            instances.insert(registration.dest.clone(), instance);
        }

        Ok(Parsed { instances })
    }

    /// Parse, or print a message and terminate: usage on stdout and exit 0
    /// for a help request, the error plus a synopsis on stderr and exit 1
    /// for everything else.
    pub fn parse_or_exit(&self, tokens: &[String]) -> Parsed {
        use std::process;

        match self.parse(tokens) {
            Ok(parsed) => parsed,
            Err(error) if error.is_help_request() => match self.render_help() {
                Ok(text) => {
                    print!("{text}");
                    process::exit(0);
                }
                Err(error) => {
                    eprintln!("error: {error}");
                    process::exit(1);
                }
            },
            Err(error) => {
                let arguments = match self.compile_internal(&[], true) {
                    Ok((compiled, _)) => compiled.arguments,
                    Err(_) => Vec::new(),
                };

                let mut stderr = io::stderr().lock();
                let _ = help::write_error(&mut stderr, &self.command, &arguments, &error);
                let _ = stderr.flush();
                process::exit(1);
            }
        }
    }

    /// Parse the process's own arguments, skipping the program name.
    pub fn parse_env_or_exit(&self) -> Parsed {
        let tokens: Vec<String> = std::env::args().skip(1).collect();
        self.parse_or_exit(&tokens)
    }

    /// Render the usage message. Unions expand their default variant;
    /// selectors with no default show only the choice itself.
    pub fn render_help(&self) -> Result<String, Error> {
        let (compiled, _) = self.compile_internal(&[], true)?;

        let mut buffer = Vec::new();
        help::write_help(
            &mut buffer,
            &self.command,
            self.description.as_deref(),
            &compiled.arguments,
        )
        .expect("writing help to a buffer cannot fail");

        Ok(String::from_utf8(buffer).expect("help output is valid UTF-8"))
    }

    fn help_requested(&self, tokens: &[String]) -> bool {
        let specs = [OptionSpec::new(HELP_OPTION, Arity::AtMostOne)];
        scan_known(&specs, tokens).contains(HELP_OPTION)
    }

    /// Compile against `tokens`: load command-line overlay files, run the
    /// selector rounds, and emit the final surface. In lenient mode a
    /// selector with no resolvable key is skipped instead of failing, so
    /// usage output works for required selectors too.
    fn compile_internal(
        &self,
        tokens: &[String],
        lenient: bool,
    ) -> Result<(CompiledSpec, Vec<OverlayMap>), Error> {
        let builtins = self.builtin_arguments();
        let cli_overlays = self.cli_overlays(tokens)?;

        let overlays = self.overlay_stack(&cli_overlays);
        let compiled = self.resolve_selections(tokens, &overlays, &builtins, lenient)?;

        Ok((compiled, cli_overlays))
    }

    /// Pre-scan for `--defaults` and load the named overlay files, before
    /// anything else looks at the tokens.
    fn cli_overlays(&self, tokens: &[String]) -> Result<Vec<OverlayMap>, Error> {
        if !self.defaults_option {
            return Ok(Vec::new());
        }

        let specs = [OptionSpec::new(DEFAULTS_OPTION, Arity::Remaining)];
        let raw = scan_known(&specs, tokens);

        let Some(value) = raw.get(DEFAULTS_OPTION) else {
            return Ok(Vec::new());
        };

        value
            .tokens()
            .iter()
            .map(|&file| OverlayMap::from_path(file))
            .collect()
    }

    /// The overlay stack, weakest layer first: registration-time overrides,
    /// then session overlay files, then `--defaults` files.
    fn overlay_stack<'a>(&'a self, cli_overlays: &'a [OverlayMap]) -> Vec<&'a OverlayMap> {
        self.registrations
            .iter()
            .filter_map(|registration| registration.default_override.as_ref())
            .chain(self.overlays.iter())
            .chain(cli_overlays.iter())
            .collect()
    }

    /// The selector rounds: compile, pre-scan for unresolved selectors,
    /// fix their keys, and repeat until the surface stops growing.
    fn resolve_selections(
        &self,
        tokens: &[String],
        overlays: &[&OverlayMap],
        builtins: &[ResolvedArgument],
        lenient: bool,
    ) -> Result<CompiledSpec, Error> {
        struct PendingSelector {
            path: String,
            external: String,
            scan_names: Vec<String>,
            default_key: Option<String>,
            choices: Vec<String>,
        }

        let mut selections: HashMap<String, String> = HashMap::new();
        let mut skipped: HashSet<String> = HashSet::new();

        for round in 0..MAX_SELECTOR_ROUNDS {
            let compiled = compile_spec(
                &self.registrations,
                self.policy,
                &selections,
                builtins,
                self.help_provider.as_ref(),
            )?;

            let pending: Vec<PendingSelector> = compiled
                .arguments
                .iter()
                .filter(|argument| {
                    argument.selector
                        && !selections.contains_key(&argument.path)
                        && !skipped.contains(&argument.path)
                })
                .map(|argument| PendingSelector {
                    path: argument.path.clone(),
                    external: argument.external.clone(),
                    scan_names: {
                        let mut names = argument.aliases.clone();
                        // accept the fully prefixed spelling too, so a
                        // selector stays reachable even when a later
                        // conflict renames it
                        if argument.path != argument.external {
                            names.push(argument.path.clone());
                        }
                        names
                    },
                    default_key: argument
                        .default
                        .as_ref()
                        .and_then(Value::as_str)
                        .map(str::to_owned),
                    choices: argument.choices.clone().unwrap_or_default(),
                })
                .collect();

            if pending.is_empty() {
                return Ok(compiled);
            }

            debug!(
                "selector round {round}: {count} unresolved variant selectors",
                count = pending.len(),
            );

            let alias_refs: Vec<Vec<&str>> = pending
                .iter()
                .map(|selector| selector.scan_names.iter().map(String::as_str).collect())
                .collect();
            let specs: Vec<OptionSpec<'_>> = pending
                .iter()
                .zip(&alias_refs)
                .map(|(selector, aliases)| OptionSpec {
                    name: selector.external.as_str(),
                    aliases: aliases.as_slice(),
                    arity: Arity::One,
                })
                .collect();

            let raw = scan_known(&specs, tokens);

            for selector in &pending {
                let from_cli = raw.get(&selector.external).and_then(|value| match value {
                    RawValue::Single(key) => Some((*key).to_owned()),
                    _ => None,
                });

                let key = match from_cli {
                    Some(key) => Some(key),
                    None => match overlays
                        .iter()
                        .rev()
                        .find_map(|overlay| overlay.get(&selector.path))
                    {
                        Some(value) => match value.as_str() {
                            Some(key) => Some(key.to_owned()),
                            None => {
                                return Err(ErrorKind::ValueConversion {
                                    path: selector.path.clone(),
                                    raw: value.to_string(),
                                    expected: choice_set(&selector.choices),
                                    message: format!(
                                        "a variant key must be a string, got {}",
                                        value.type_name(),
                                    ),
                                }
                                .into());
                            }
                        },
                        None => selector.default_key.clone(),
                    },
                };

                let Some(key) = key else {
                    if lenient {
                        skipped.insert(selector.path.clone());
                        continue;
                    }
                    return Err(ErrorKind::MissingRequiredArgument {
                        path: selector.path.clone(),
                    }
                    .into());
                };

                if !selector.choices.iter().any(|choice| *choice == key) {
                    return Err(ErrorKind::ValueConversion {
                        path: selector.path.clone(),
                        raw: key,
                        expected: choice_set(&selector.choices),
                        message: format!(
                            "expected one of: {}",
                            selector.choices.join(", "),
                        ),
                    }
                    .into());
                }

                debug!(
                    "selector '{path}' resolved to variant '{key}'",
                    path = selector.path,
                );
                selections.insert(selector.path.clone(), key);
            }
        }

        Err(ErrorKind::Reconstruction {
            path: String::new(),
            message: format!("variant selection did not converge in {MAX_SELECTOR_ROUNDS} rounds"),
        }
        .into())
    }

    fn builtin_arguments(&self) -> Vec<ResolvedArgument> {
        let mut builtins = vec![ResolvedArgument {
            external: HELP_OPTION.to_owned(),
            aliases: Vec::new(),
            arity: Arity::AtMostOne,
            path: String::new(),
            merge_paths: Vec::new(),
            required: false,
            default: None,
            help: Some("show this message and exit".to_owned()),
            choices: None,
            placeholder: String::new(),
            selector: false,
            builtin: true,
        }];

        if self.defaults_option {
            builtins.push(ResolvedArgument {
                external: DEFAULTS_OPTION.to_owned(),
                aliases: Vec::new(),
                arity: Arity::Remaining,
                path: String::new(),
                merge_paths: Vec::new(),
                required: false,
                default: None,
                help: Some(
                    "load default values from the given file(s); later files \
                     and explicit options win"
                        .to_owned(),
                ),
                choices: None,
                placeholder: "FILE".to_owned(),
                selector: false,
                builtin: true,
            });
        }

        builtins
    }
}

fn choice_set(choices: &[String]) -> String {
    format!("one of {{{}}}", choices.join("|"))
}

/// The output of a successful parse: one reconstructed instance per
/// registered destination path.
#[derive(Debug, Clone)]
pub struct Parsed {
    instances: HashMap<String, StructValue>,
}

impl Parsed {
    /// The instance registered at `dest`.
    pub fn instance(&self, dest: &str) -> Option<&StructValue> {
        self.instances.get(dest)
    }

    /// The instance at `dest`, converted to a concrete type.
    pub fn get<T: FromStructure>(&self, dest: &str) -> Result<T, Error> {
        let instance = self
            .instances
            .get(dest)
            .ok_or_else(|| ErrorKind::Reconstruction {
                path: dest.to_owned(),
                message: "nothing was registered at this destination".to_owned(),
            })?;

        T::from_structure(instance)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StructValue)> {
        self.instances
            .iter()
            .map(|(dest, instance)| (dest.as_str(), instance))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
