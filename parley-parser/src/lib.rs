/*!
Low-level, spec-driven tokenizing of command-line options. Given a set of
option specs (names, aliases, arity) and a raw token stream, this crate
classifies each token and collects the raw string values for every option it
recognizes. No type handling happens here; values come back out exactly as
the strings they arrived in, keyed by the canonical option name. Usually
this is too low level to use directly.

Tokenizing runs in one of two modes: a strict pass that fails on anything it
doesn't recognize, and a lenient scan ([`scan_known`]) that quietly skips
unrecognized tokens. The lenient scan exists so that a caller can read a few
distinguished options (say, a variant selector) out of the stream before it
knows the full option surface.
*/

use core::fmt::{self, Display};
use std::collections::HashMap;
use std::error;

/// How many value tokens an option consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly one value token.
    One,

    /// Zero or one value tokens. An occurrence with no value is recorded as
    /// [`RawValue::Present`].
    AtMostOne,

    /// Exactly this many value tokens.
    Exactly(usize),

    /// Every following token up to the next option-like token.
    Remaining,
}

/**
A single named option the tokenizer should recognize.

Names and aliases are given without their leading dashes; the tokenizer
matches them against `--name` tokens. Aliases are alternate spellings that
record under the canonical `name`.
*/
#[derive(Debug, Clone, Copy)]
pub struct OptionSpec<'s> {
    pub name: &'s str,
    pub aliases: &'s [&'s str],
    pub arity: Arity,
}

impl<'s> OptionSpec<'s> {
    #[inline]
    #[must_use]
    pub fn new(name: &'s str, arity: Arity) -> Self {
        Self {
            name,
            aliases: &[],
            arity,
        }
    }
}

/// The raw value collected for one option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue<'i> {
    /// The option appeared with no value token (only possible for
    /// [`Arity::AtMostOne`]).
    Present,

    /// The option got a single value token.
    Single(&'i str),

    /// The option got a list of value tokens (possibly empty, for
    /// [`Arity::Remaining`]).
    Many(Vec<&'i str>),
}

impl<'i> RawValue<'i> {
    /// View the value as a flat list of tokens. `Present` has no tokens.
    pub fn tokens(&self) -> &[&'i str] {
        match self {
            RawValue::Present => &[],
            RawValue::Single(value) => core::slice::from_ref(value),
            RawValue::Many(values) => values,
        }
    }
}

/**
The collected output of a tokenizing pass: raw values keyed by the canonical
name of the option that produced them. Values borrow from the input token
stream.
*/
#[derive(Debug, Default)]
pub struct RawValues<'s, 'i> {
    values: HashMap<&'s str, RawValue<'i>>,
}

impl<'s, 'i> RawValues<'s, 'i> {
    #[inline]
    pub fn get(&self, name: &str) -> Option<&RawValue<'i>> {
        self.values.get(name)
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'s str, &RawValue<'i>)> {
        self.values.iter().map(|(&name, value)| (name, value))
    }

    /// Record a value. Repeated occurrences of the same option overwrite,
    /// except that `Many` values under `extend` append instead, so that
    /// `--tag a --tag b` accumulates.
    fn record(&mut self, name: &'s str, value: RawValue<'i>, extend: bool) {
        use std::collections::hash_map::Entry;

        match self.values.entry(name) {
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
            Entry::Occupied(mut slot) => match (slot.get_mut(), value, extend) {
                (RawValue::Many(existing), RawValue::Many(mut new), true) => {
                    existing.append(&mut new);
                }
                (slot_value, value, _) => *slot_value = value,
            },
        }
    }
}

/// Things that can go wrong while tokenizing in strict mode.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum TokenSyntaxError {
    /// An option-like token didn't match any known option.
    UnknownOption { option: String },

    /// A bare token appeared where no positional parameters are expected.
    UnexpectedPositional { token: String },

    /// An option consumed fewer value tokens than its arity requires.
    MissingValue {
        option: String,
        expected: usize,
        found: usize,
    },
}

impl Display for TokenSyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenSyntaxError::UnknownOption { option } => {
                write!(f, "unrecognized option --{option}")
            }
            TokenSyntaxError::UnexpectedPositional { token } => {
                write!(f, "unexpected positional argument {token:?}")
            }
            TokenSyntaxError::MissingValue {
                option,
                expected,
                found,
            } => write!(
                f,
                "option --{option} requires {expected} value{s}, got {found}",
                s = if *expected == 1 { "" } else { "s" },
            ),
        }
    }
}

impl error::Error for TokenSyntaxError {}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Role {
    /// Recognized and recorded.
    Active,

    /// Recognized, values consumed, nothing recorded.
    Shadow,
}

/**
Strict tokenizing pass. Every option-like token must match either `specs`
(recorded) or `shadows` (consumed and discarded); anything else is an error,
as is a bare positional token. When a name appears in both sets, the active
spec wins.
*/
pub fn tokenize<'s, 'i>(
    specs: &[OptionSpec<'s>],
    shadows: &[OptionSpec<'s>],
    tokens: &'i [String],
) -> Result<RawValues<'s, 'i>, TokenSyntaxError> {
    run(specs, shadows, tokens, true)
}

/**
Lenient scan. Collects values for the options in `specs` and quietly steps
over everything else, including options that are missing their values.
*/
pub fn scan_known<'s, 'i>(specs: &[OptionSpec<'s>], tokens: &'i [String]) -> RawValues<'s, 'i> {
    match run(specs, &[], tokens, false) {
        Ok(values) => values,
        // lenient mode never produces an error
        Err(_) => RawValues::default(),
    }
}

fn run<'s, 'i>(
    specs: &[OptionSpec<'s>],
    shadows: &[OptionSpec<'s>],
    tokens: &'i [String],
    strict: bool,
) -> Result<RawValues<'s, 'i>, TokenSyntaxError> {
    let mut lookup: HashMap<&'s str, (&'s str, Arity, Role)> = HashMap::new();

    for spec in specs {
        lookup.insert(spec.name, (spec.name, spec.arity, Role::Active));
        for &alias in spec.aliases {
            let alias = alias.trim_start_matches('-');
            lookup.insert(alias, (spec.name, spec.arity, Role::Active));
        }
    }

    // Shadow specs never displace an active name
    for spec in shadows {
        lookup
            .entry(spec.name)
            .or_insert((spec.name, spec.arity, Role::Shadow));
        for &alias in spec.aliases {
            let alias = alias.trim_start_matches('-');
            lookup
                .entry(alias)
                .or_insert((spec.name, spec.arity, Role::Shadow));
        }
    }

    let mut out = RawValues::default();
    let mut i = 0;
    let mut positional_only = false;

    while i < tokens.len() {
        let token = tokens[i].as_str();

        if positional_only || !is_option(token) {
            if strict {
                return Err(TokenSyntaxError::UnexpectedPositional {
                    token: token.to_owned(),
                });
            }
            i += 1;
            continue;
        }

        if token == "--" {
            positional_only = true;
            i += 1;
            continue;
        }

        let body = &token[2..];
        let (name, inline) = match memchr::memchr(b'=', body.as_bytes()) {
            Some(at) => (&body[..at], Some(&body[at + 1..])),
            None => (body, None),
        };

        let Some(&(canonical, arity, role)) = lookup.get(name) else {
            if strict {
                return Err(TokenSyntaxError::UnknownOption {
                    option: name.to_owned(),
                });
            }
            i += 1;
            continue;
        };

        i += 1;

        let value = match inline {
            Some(inline) => match arity {
                Arity::One | Arity::AtMostOne => Some(RawValue::Single(inline)),
                Arity::Exactly(1) => Some(RawValue::Many(vec![inline])),
                Arity::Exactly(expected) => {
                    if strict {
                        return Err(TokenSyntaxError::MissingValue {
                            option: name.to_owned(),
                            expected,
                            found: 1,
                        });
                    }
                    None
                }
                Arity::Remaining => Some(RawValue::Many(vec![inline])),
            },
            None => match arity {
                Arity::One => match next_value(tokens, &mut i) {
                    Some(value) => Some(RawValue::Single(value)),
                    None => {
                        if strict {
                            return Err(TokenSyntaxError::MissingValue {
                                option: name.to_owned(),
                                expected: 1,
                                found: 0,
                            });
                        }
                        None
                    }
                },
                Arity::AtMostOne => match next_value(tokens, &mut i) {
                    Some(value) => Some(RawValue::Single(value)),
                    None => Some(RawValue::Present),
                },
                Arity::Exactly(expected) => {
                    let mut values = Vec::with_capacity(expected);
                    while values.len() < expected {
                        match next_value(tokens, &mut i) {
                            Some(value) => values.push(value),
                            None => break,
                        }
                    }

                    if values.len() < expected {
                        if strict {
                            return Err(TokenSyntaxError::MissingValue {
                                option: name.to_owned(),
                                expected,
                                found: values.len(),
                            });
                        }
                        None
                    } else {
                        Some(RawValue::Many(values))
                    }
                }
                Arity::Remaining => {
                    let mut values = Vec::new();
                    while let Some(value) = next_value(tokens, &mut i) {
                        values.push(value);
                    }
                    Some(RawValue::Many(values))
                }
            },
        };

        if let Some(value) = value
            && role == Role::Active
        {
            out.record(canonical, value, arity == Arity::Remaining);
        }
    }

    Ok(out)
}

/// A token is option-like if it starts with `--`. Single-dash tokens are
/// left alone so that negative numbers can be option values.
#[inline]
fn is_option(token: &str) -> bool {
    token.starts_with("--")
}

fn next_value<'i>(tokens: &'i [String], i: &mut usize) -> Option<&'i str> {
    match tokens.get(*i) {
        Some(token) if !is_option(token) => {
            *i += 1;
            Some(token.as_str())
        }
        _ => None,
    }
}
