//! Builtin Functions
//!
//! Builtins are pure, name-dispatched functions callable from spokfile
//! global assignments, e.g. `GIT_COMMIT := exec("git rev-parse HEAD")`.
//! The registry is static and read-only; there are exactly two entries:
//!
//! - `join(parts...)` joins path segments with the OS separator
//! - `exec(cmd)` runs an external program and returns its trimmed stdout

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::process::Command;

use lazy_static::lazy_static;
use thiserror::Error;

/// A builtin: takes string arguments, returns a string.
pub type Builtin = fn(&[String]) -> Result<String, BuiltinError>;

#[derive(Debug, Error)]
pub enum BuiltinError {
    #[error("Unknown builtin function {0:?}")]
    Unknown(String),

    #[error("{name} takes {expected}, got {got} argument(s)")]
    WrongArity {
        name: &'static str,
        expected: &'static str,
        got: usize,
    },

    #[error("Unparseable command string {0:?}")]
    Unparseable(String),

    #[error("Could not start command {cmd:?}: {source}")]
    Start {
        cmd: String,
        #[source]
        source: io::Error,
    },

    #[error("Command {cmd:?} exited with status {status}\nstdout: {stdout}\nstderr: {stderr}")]
    NonZeroExit {
        cmd: String,
        status: i32,
        stdout: String,
        stderr: String,
    },
}

lazy_static! {
    static ref BUILTINS: HashMap<&'static str, Builtin> = {
        let mut m: HashMap<&'static str, Builtin> = HashMap::new();
        m.insert("join", join as Builtin);
        m.insert("exec", exec as Builtin);
        m
    };
}

/// Look up a builtin by name.
pub fn lookup(name: &str) -> Result<Builtin, BuiltinError> {
    BUILTINS
        .get(name)
        .copied()
        .ok_or_else(|| BuiltinError::Unknown(name.to_string()))
}

/// OS-specific path join of the arguments. Always succeeds.
fn join(args: &[String]) -> Result<String, BuiltinError> {
    let mut path = PathBuf::new();
    for part in args {
        path.push(part);
    }
    Ok(path.to_string_lossy().into_owned())
}

/// Run an external program, returning its stdout with surrounding
/// whitespace trimmed. A non-zero exit is an error here, unlike task
/// commands: a broken builtin call fails the whole file.
fn exec(args: &[String]) -> Result<String, BuiltinError> {
    if args.len() != 1 {
        return Err(BuiltinError::WrongArity {
            name: "exec",
            expected: "exactly 1",
            got: args.len(),
        });
    }
    let cmd = &args[0];
    let words = split_words(cmd)?;
    let (prog, rest) = words
        .split_first()
        .ok_or_else(|| BuiltinError::Unparseable(cmd.clone()))?;

    let output = Command::new(prog)
        .args(rest)
        .output()
        .map_err(|source| BuiltinError::Start { cmd: cmd.clone(), source })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if !output.status.success() {
        return Err(BuiltinError::NonZeroExit {
            cmd: cmd.clone(),
            status: output.status.code().unwrap_or(-1),
            stdout,
            stderr,
        });
    }
    Ok(stdout.trim().to_string())
}

/// Shell-style word splitting: whitespace separates words, single and
/// double quotes group them, backslash escapes the next character.
fn split_words(cmd: &str) -> Result<Vec<String>, BuiltinError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = cmd.chars();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                } else if c == '\\' && q == '"' {
                    match chars.next() {
                        Some(next) => current.push(next),
                        None => return Err(BuiltinError::Unparseable(cmd.to_string())),
                    }
                } else {
                    current.push(c);
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    in_word = true;
                }
                '\\' => match chars.next() {
                    Some(next) => {
                        current.push(next);
                        in_word = true;
                    }
                    None => return Err(BuiltinError::Unparseable(cmd.to_string())),
                },
                c if c.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                _ => {
                    current.push(c);
                    in_word = true;
                }
            },
        }
    }
    if quote.is_some() {
        return Err(BuiltinError::Unparseable(cmd.to_string()));
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}
