//! Password pattern loading, vocabulary validation, and output naming.
//!
//! A pattern is one line of a pattern file, e.g. `{name}{year}{suffix}`.
//! Every `{variable}` it references must belong to the registered
//! vocabulary ([`crate::vars::VARIABLES`]); validation is exhaustive so a
//! pattern file can be fixed in a single pass.
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::vars::VARIABLES;

#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    /// One entry per (1-based pattern index, unknown variable) pair.
    #[error("unknown template variables: {}", .0.join(", "))]
    UnknownVariables(Vec<String>),
}

fn variable_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").unwrap())
}

/// Names of every `{variable}` occurrence in `text`, in order, duplicates
/// included.
pub(crate) fn variables_in(text: &str) -> Vec<String> {
    variable_re()
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect()
}

/// One password template line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern(String);

impl Pattern {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn variables(&self) -> Vec<String> {
        variables_in(&self.0)
    }

    pub fn uses_extra(&self) -> bool {
        self.variables().iter().any(|v| v == "extra")
    }

    /// Wordlist file stem for this pattern, optionally specialized for one
    /// extra word. Reproduces the original naming rules: `{separator}` and
    /// `{suffix}` are dropped, literal `_` becomes `-`, braces become `_`,
    /// runs of `_` collapse, and the extra word replaces the text `extra`.
    pub fn output_name(&self, extra: Option<&str>) -> String {
        static DROP: OnceLock<Regex> = OnceLock::new();
        static UNDERSCORES: OnceLock<Regex> = OnceLock::new();
        let drop = DROP.get_or_init(|| Regex::new(r"\{separator\}|\{suffix\}").unwrap());
        let collapse = UNDERSCORES.get_or_init(|| Regex::new(r"_+").unwrap());

        let name = drop.replace_all(&self.0, "");
        let name = name.replace('_', "-");
        let name = name.replace(['{', '}'], "_");
        let name = collapse.replace_all(&name, "_");
        let name = name.trim_matches('_').to_string();
        match extra {
            Some(word) => name.replace("extra", word),
            None => name,
        }
    }
}

/// Load patterns from a file, skipping blank lines and `#` comments.
pub fn load_patterns<P: AsRef<Path>>(path: P) -> Result<Vec<Pattern>> {
    let file = File::open(&path).with_context(|| format!("open {}", path.as_ref().display()))?;
    let mut patterns = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        patterns.push(Pattern::new(line));
    }
    Ok(patterns)
}

/// Fail if any pattern references a variable outside the registered
/// vocabulary. Reports every violation, not just the first; succeeding is a
/// side-effect-free no-op.
pub fn validate_patterns(patterns: &[Pattern]) -> Result<(), PatternError> {
    let mut unknown = Vec::new();
    for (index, pattern) in patterns.iter().enumerate() {
        for var in pattern.variables() {
            if !VARIABLES.contains(&var.as_str()) {
                unknown.push(format!("pattern #{} uses {{{}}}", index + 1, var));
            }
        }
    }
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(PatternError::UnknownVariables(unknown))
    }
}
