/*!
Rendering of usage and error messages from a compiled argument surface.

The layout follows the common description / synopsis / options shape. Every
resolved argument is listed with its primary name, aliases, value
placeholder (or choice set), and rendered default; discarded variant
surfaces never appear here because they are not part of the emitted spec.
*/

use std::io::{self, Write as _};

use indent_write::io::IndentWriter;
use joinery::JoinableIterator;
use lazy_format::lazy_format;
use textwrap::fill;

use crate::emit::{Arity, ResolvedArgument};
use crate::error::Error;

/// Column where single-line argument descriptions start.
const DESCRIPTION_COLUMN: usize = 30;

/// Wrap width for long description text.
const WRAP_WIDTH: usize = 64;

/// Write the full usage message.
pub(crate) fn write_help(
    out: &mut impl io::Write,
    command: &str,
    description: Option<&str>,
    arguments: &[ResolvedArgument],
) -> io::Result<()> {
    if let Some(description) = description {
        writeln!(out, "{}", fill(description, WRAP_WIDTH + DESCRIPTION_COLUMN))?;
    }

    write_synopsis(out, command, arguments)?;

    section(out, "Options", |out| {
        arguments
            .iter()
            .try_for_each(|argument| write_argument(out, argument))
    })
}

/// Write the one-line synopsis: the command, an `[OPTIONS]` marker when
/// anything is optional, and each required option spelled out.
pub(crate) fn write_synopsis(
    out: &mut impl io::Write,
    command: &str,
    arguments: &[ResolvedArgument],
) -> io::Result<()> {
    section(out, "Synopsis", |out| {
        write!(out, "{command}")?;

        if arguments.iter().any(|argument| !argument.is_required()) {
            write!(out, " [OPTIONS]")?;
        }

        for argument in arguments.iter().filter(|argument| argument.is_required()) {
            write!(
                out,
                " --{name} <{placeholder}>",
                name = argument.external(),
                placeholder = placeholder(argument),
            )?;
        }

        writeln!(out)
    })
}

/// Write an error plus the synopsis that would have avoided it.
pub(crate) fn write_error(
    out: &mut impl io::Write,
    command: &str,
    arguments: &[ResolvedArgument],
    error: &Error,
) -> io::Result<()> {
    writeln!(out, "error: {error}")?;
    write_synopsis(out, command, arguments)?;
    writeln!(
        out,
        "\nRun with --help for the full list of options."
    )
}

fn write_argument(
    out: &mut (impl io::Write + ?Sized),
    argument: &ResolvedArgument,
) -> io::Result<()> {
    let names = lazy_format!(
        "--{name}{aliases}",
        name = argument.external(),
        aliases = argument
            .aliases()
            .iter()
            .map(|alias| lazy_format!(", --{alias}"))
            .join_concat(),
    );

    let tags = match value_slot(argument) {
        None => names.to_string(),
        Some(slot) => format!("{names} {slot}"),
    };

    let description = describe_argument(argument);

    // short enough descriptions share the line with the tags; everything
    // else drops to an indented block, like the long-help layouts of
    // bigger parsers
    if description.is_empty() {
        writeln!(out, "{tags}")
    } else if tags.len() + 2 <= DESCRIPTION_COLUMN && description.len() <= WRAP_WIDTH {
        writeln!(
            out,
            "{tags}{space}{description}",
            space = " ".repeat(DESCRIPTION_COLUMN - tags.len()),
        )
    } else {
        writeln!(out, "{tags}")?;
        let mut indented = IndentWriter::new("        ", &mut *out);
        writeln!(indented, "{}", fill(&description, WRAP_WIDTH))
    }
}

/// The value placeholder shown after the option names, if the option takes
/// a value at all.
fn value_slot(argument: &ResolvedArgument) -> Option<String> {
    if argument.placeholder().is_empty() {
        return None;
    }

    Some(match argument.choices() {
        Some(choices) => format!("{{{}}}", choices.iter().join_with("|")),
        None => format!("<{}>", placeholder(argument)),
    })
}

fn placeholder(argument: &ResolvedArgument) -> String {
    match argument.arity() {
        Arity::Remaining => format!("{}...", argument.placeholder()),
        Arity::Exactly(len) if len > 1 => {
            format!("{placeholder} x{len}", placeholder = argument.placeholder())
        }
        _ => argument.placeholder().to_owned(),
    }
}

fn describe_argument(argument: &ResolvedArgument) -> String {
    let help = argument.help().unwrap_or("");

    let suffix = if argument.is_required() {
        Some("(required)".to_owned())
    } else {
        argument
            .default()
            .map(|default| format!("(default: {default})"))
    };

    match (help.is_empty(), suffix) {
        (true, None) => String::new(),
        (true, Some(suffix)) => suffix,
        (false, None) => help.to_owned(),
        (false, Some(suffix)) => format!("{help} {suffix}"),
    }
}

/// Write a section: a blank line, the header, then the indented body.
fn section<O: io::Write, T>(
    out: &mut O,
    header: &str,
    body: impl FnOnce(&mut IndentWriter<&mut O>) -> io::Result<T>,
) -> io::Result<T> {
    writeln!(out, "\n{header}:")?;
    body(&mut IndentWriter::new("  ", out))
}
