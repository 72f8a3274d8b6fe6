//! `$(NAME)` placeholder substitution.
//!
//! Placeholders are looked up through a [`Scope`], an innermost-first stack of
//! [`Environment`] layers. Substituted values are inserted literally and never
//! re-expanded.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VarError {
    #[error("undefined variable $({name})")]
    Undefined { name: String },
    #[error("unterminated placeholder in '{input}'")]
    Unterminated { input: String },
    #[error("invalid variable name '{name}' in '{input}'")]
    InvalidName { name: String, input: String },
    #[error("invalid assignment '{input}', expected NAME=VALUE")]
    InvalidAssignment { input: String },
}

/// A set of variable bindings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Layer `other` on top of `self`; bindings in `other` win.
    pub fn merge(&mut self, other: &Environment) {
        for (name, value) in other.iter() {
            self.set(name, value);
        }
    }

    /// Names that are not valid placeholder names, if any.
    pub fn invalid_names(&self) -> Vec<&str> {
        self.vars
            .keys()
            .map(String::as_str)
            .filter(|name| !is_valid_name(name))
            .collect()
    }

    /// Parse a `NAME=VALUE` command-line assignment.
    pub fn parse_assignment(input: &str) -> Result<(String, String), VarError> {
        let Some((name, value)) = input.split_once('=') else {
            return Err(VarError::InvalidAssignment {
                input: input.to_owned(),
            });
        };
        let name = name.trim();
        if !is_valid_name(name) {
            return Err(VarError::InvalidName {
                name: name.to_owned(),
                input: input.to_owned(),
            });
        }
        Ok((name.to_owned(), value.to_owned()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Innermost-first stack of environments used for lookup.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    layers: &'a [&'a Environment],
}

impl<'a> Scope<'a> {
    pub fn new(layers: &'a [&'a Environment]) -> Self {
        Self { layers }
    }

    pub fn lookup(&self, name: &str) -> Option<&'a str> {
        self.layers.iter().copied().find_map(|env| env.get(name))
    }

    pub fn expand(&self, input: &str) -> Result<String, VarError> {
        substitute(input, |name| self.lookup(name))
    }
}

pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Replace every `$(NAME)` in `input` with the value `lookup` returns for it.
///
/// A `$` that is not followed by `(` is kept literally.
pub fn substitute<'v, F>(input: &str, lookup: F) -> Result<String, VarError>
where
    F: Fn(&str) -> Option<&'v str>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("$(") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find(')') else {
            return Err(VarError::Unterminated {
                input: input.to_owned(),
            });
        };
        let name = &after[..end];
        if !is_valid_name(name) {
            return Err(VarError::InvalidName {
                name: name.to_owned(),
                input: input.to_owned(),
            });
        }
        let value = lookup(name).ok_or_else(|| VarError::Undefined {
            name: name.to_owned(),
        })?;
        out.push_str(value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
