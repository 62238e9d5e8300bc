//! Output mode shared by all subcommands.
//!
//! `main` exports the global flags as environment variables so that every
//! subcommand can check them without threading them through.

use serde::Serialize;

pub const JSON_ENV: &str = "UNITWATCH_JSON";
pub const QUIET_ENV: &str = "UNITWATCH_QUIET";

fn flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "1").unwrap_or(false)
}

/// Whether `--json` was passed.
pub fn is_json() -> bool {
    flag(JSON_ENV)
}

/// Whether `--quiet` was passed.
pub fn is_quiet() -> bool {
    flag(QUIET_ENV)
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("  Error: failed to encode output: {e}"),
    }
}
