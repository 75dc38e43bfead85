//! # Command Line Parameters
//!
//! Flat `-key:value` token stream:
//!
//! ```text
//!   -gamesDir:C:\games -fullscreen -title:My Game
//!   └── key ┘└ value ┘ └ key ───┘  └key┘└ value ┘
//! ```
//!
//! A value runs until whitespace followed by `-` and is trimmed, so values may
//! contain spaces and embedded dashes (`-name:half-life`). A key with no `:`
//! gets an empty value.

use std::collections::BTreeMap;

use crate::error::{CoreError, CoreResult};

/// Parsed command line parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Parameters {
    values: BTreeMap<String, String>,
}

impl Parameters {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses process arguments (without the program name).
    ///
    /// # Errors
    ///
    /// See [`Parameters::add_parameter_string`]. Parameters parsed before the
    /// error are discarded along with the set; use `add_parameter_string`
    /// directly to keep them.
    pub fn from_args<I, S>(args: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = args
            .into_iter()
            .map(|arg| arg.as_ref().to_owned())
            .collect::<Vec<_>>()
            .join(" ");
        let mut params = Self::new();
        params.add_parameter_string(&joined)?;
        Ok(params)
    }

    /// Parses `input` and merges every parameter into the set.
    ///
    /// Later occurrences of a key overwrite earlier ones.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidParameter`] on a token that does not start
    /// with `-` or has an empty key. Parsing stops there; everything parsed
    /// before the bad token stays in the set.
    pub fn add_parameter_string(&mut self, input: &str) -> CoreResult<()> {
        let mut rest = input.trim_start();

        while !rest.is_empty() {
            let offset = input.len() - rest.len();
            let Some(body) = rest.strip_prefix('-') else {
                return Err(CoreError::InvalidParameter {
                    offset,
                    reason: "expected '-' to start a parameter".to_owned(),
                });
            };

            let key_end = body
                .find(|c: char| c == ':' || c.is_whitespace())
                .unwrap_or(body.len());
            let key = &body[..key_end];
            if key.is_empty() {
                return Err(CoreError::InvalidParameter {
                    offset,
                    reason: "empty parameter key".to_owned(),
                });
            }

            let after_key = &body[key_end..];
            let (value, next) = match after_key.strip_prefix(':') {
                Some(text) => {
                    let end = value_end(text);
                    (text[..end].trim(), &text[end..])
                }
                None => ("", after_key),
            };

            tracing::debug!("parameter {} = {:?}", key, value);
            self.values.insert(key.to_owned(), value.to_owned());
            rest = next.trim_start();
        }

        Ok(())
    }

    /// Returns true if `key` was supplied.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Value of `key`, if supplied.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no parameters were supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Byte index where a value ends: the first `-` preceded by whitespace.
fn value_end(text: &str) -> usize {
    let mut previous_was_space = false;
    for (index, c) in text.char_indices() {
        if c == '-' && previous_was_space {
            return index;
        }
        previous_was_space = c.is_whitespace();
    }
    text.len()
}
