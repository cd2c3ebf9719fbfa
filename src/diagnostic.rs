//! Renders errors the way users see them: the file, the offending line with carets under the
//! culprit, then a headline naming the kind of error and where it happened.

use crate::interpreter::Error;
use crate::location::Location;
use ansi_term::{Colour, Style};
use atty::Stream;
use std::fmt::Write;
use std::io;

struct Palette {
    bold: Style,
    underline: Style,
    warning: Style,
    fail: Style,
}

impl Palette {
    fn new(colour: bool) -> Self {
        if colour {
            Self {
                bold: Style::new().bold(),
                underline: Style::new().underline(),
                warning: Colour::Yellow.normal(),
                fail: Colour::Red.bold(),
            }
        } else {
            Self {
                bold: Style::new(),
                underline: Style::new(),
                warning: Style::new(),
                fail: Style::new(),
            }
        }
    }
}

/// Sentences end with a full stop unless they already have some punctuation.
fn punctuate(message: &str) -> String {
    let message = message.trim_end();
    match message.chars().last() {
        Some('.') | Some('!') | Some('?') | None => message.to_string(),
        Some(_) => format!("{}.", message),
    }
}

fn render_at(title: &str, location: &Location, message: &str, colour: bool) -> String {
    let p = Palette::new(colour);
    let file = location.path().display().to_string();
    let mut out = String::new();

    writeln!(out, "`{}' at:", p.underline.paint(&file)).ok();
    let line_number = location.line.to_string();
    writeln!(
        out,
        "    {} {}",
        p.bold.paint(format!("{}|", line_number)),
        p.warning.paint(location.snippet())
    )
    .ok();
    let indent = 4 + line_number.len() + 2 + location.column.saturating_sub(1);
    writeln!(
        out,
        "{}{}",
        " ".repeat(indent),
        p.fail.paint("^".repeat(location.span.max(1)))
    )
    .ok();

    let message = punctuate(message).replace('\n', "\n\t  ");
    write!(
        out,
        "{} at {} in file `{}':\n\t{} {}",
        p.fail.paint(format!("[!!] - {}", title)),
        p.bold.paint(format!("({}:{})", location.line, location.column)),
        p.underline.paint(&file),
        p.bold.paint(p.warning.paint(">>>").to_string()),
        p.warning.paint(message)
    )
    .ok();
    out
}

/// Errors from `require`d files show the whole chain, innermost first.
pub fn render(error: &Error, colour: bool) -> String {
    let title = format!("{} Error", error.label());
    let mut out = render_at(&title, error.location(), &error.headline(), colour);
    if let Some(cause) = error.cause() {
        out = format!("{}\n\n{}", render(cause, colour), out);
    }
    out
}

pub fn use_colour() -> bool {
    atty::is(Stream::Stderr)
}

pub fn report(error: &Error) {
    eprintln!("\n{}\n", render(error, use_colour()));
}

/// Goes straight to stderr, so warnings show up even when logging is compiled out.
pub fn warn(message: &str, location: &Location) {
    write_warning(&mut io::stderr(), message, location, use_colour()).ok();
}

fn write_warning(
    out: &mut impl io::Write,
    message: &str,
    location: &Location,
    colour: bool,
) -> io::Result<()> {
    let text = format!("\n{}\n\n", render_at("Warning", location, message, colour));
    out.write_all(text.as_bytes())
}
