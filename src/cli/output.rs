//! Coloured terminal output
//!
//! `colored` honours NO_COLOR, CLICOLOR and CLICOLOR_FORCE.

use std::fmt::Display;

use colored::Colorize;

/// `error:` in red on stderr.
pub fn error(msg: &(impl Display + ?Sized)) {
    eprintln!("{}: {}", "error".red().bold(), msg);
}

/// `Warning:` in yellow on stderr, used for ruleset violations.
pub fn warning(msg: &(impl Display + ?Sized)) {
    eprintln!("{}: {}", "Warning".yellow(), msg);
}

pub fn success(msg: &(impl Display + ?Sized)) {
    println!("{} {}", "✓".green(), msg);
}

pub fn success_detail(msg: &(impl Display + ?Sized)) {
    println!("  {} {}", "✓".green(), msg);
}

pub fn failure(msg: &(impl Display + ?Sized)) {
    println!("  {} {}", "✗".red(), msg);
}

/// Completed action with a green label, e.g. `exploded: book`.
pub fn action(label: &str, msg: &(impl Display + ?Sized)) {
    println!("{}: {}", label.green(), msg);
}

pub fn header(msg: &(impl Display + ?Sized)) {
    println!("{}", msg.to_string().cyan().bold());
}

pub fn detail(msg: &(impl Display + ?Sized)) {
    println!("  {}", msg);
}

/// Uncoloured, for trees and TOML that may be piped.
pub fn info(msg: &(impl Display + ?Sized)) {
    println!("{}", msg);
}
