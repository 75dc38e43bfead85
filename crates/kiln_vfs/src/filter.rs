//! # File Filters
//!
//! Predicates over node names, applied during enumeration only; lookup by
//! name ignores filters.
//!
//! ```rust,ignore
//! use kiln_vfs::filter::{self, FilterExt};
//!
//! // every .png except the thumbnails
//! let pngs = filter::extension_include("png").and(filter::name_exclude("^thumb_")?);
//! ```

use regex::Regex;

use crate::error::{VfsError, VfsResult};

/// A predicate over node names.
pub trait FileFilter: Send + Sync {
    /// Returns true if a node named `name` passes the filter.
    fn accept(&self, name: &str) -> bool;
}

impl<F> FileFilter for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn accept(&self, name: &str) -> bool {
        self(name)
    }
}

/// Accepts names matching a regular expression (searched, not anchored).
#[derive(Debug, Clone)]
pub struct NameInclude(Regex);

/// Rejects names matching a regular expression (searched, not anchored).
#[derive(Debug, Clone)]
pub struct NameExclude(Regex);

/// Accepts names whose extension equals the given one.
#[derive(Debug, Clone)]
pub struct ExtensionInclude(String);

/// Rejects names whose extension equals the given one.
#[derive(Debug, Clone)]
pub struct ExtensionExclude(String);

/// Accepts names both filters accept.
#[derive(Debug, Clone)]
pub struct And<A, B>(A, B);

/// Accepts names either filter accepts.
#[derive(Debug, Clone)]
pub struct Or<A, B>(A, B);

/// Inverts a filter.
#[derive(Debug, Clone)]
pub struct Not<A>(A);

/// Builds a [`NameInclude`] filter.
///
/// # Errors
///
/// Returns [`VfsError::InvalidFilter`] if `pattern` is not a valid regex.
pub fn name_include(pattern: &str) -> VfsResult<NameInclude> {
    compile(pattern).map(NameInclude)
}

/// Builds a [`NameExclude`] filter.
///
/// # Errors
///
/// Returns [`VfsError::InvalidFilter`] if `pattern` is not a valid regex.
pub fn name_exclude(pattern: &str) -> VfsResult<NameExclude> {
    compile(pattern).map(NameExclude)
}

/// Builds an [`ExtensionInclude`] filter. A leading `.` is ignored and
/// matching is ASCII case-insensitive.
#[must_use]
pub fn extension_include(extension: &str) -> ExtensionInclude {
    ExtensionInclude(normalize_extension(extension))
}

/// Builds an [`ExtensionExclude`] filter. A leading `.` is ignored and
/// matching is ASCII case-insensitive.
#[must_use]
pub fn extension_exclude(extension: &str) -> ExtensionExclude {
    ExtensionExclude(normalize_extension(extension))
}

fn compile(pattern: &str) -> VfsResult<Regex> {
    Regex::new(pattern).map_err(|e| VfsError::InvalidFilter(e.to_string()))
}

fn normalize_extension(extension: &str) -> String {
    extension.trim_start_matches('.').to_ascii_lowercase()
}

/// Text after the last `.`; names without one (or dotfiles) have none.
fn extension_of(name: &str) -> Option<&str> {
    match name.rfind('.') {
        Some(0) | None => None,
        Some(dot) => Some(&name[dot + 1..]),
    }
}

impl FileFilter for NameInclude {
    fn accept(&self, name: &str) -> bool {
        self.0.is_match(name)
    }
}

impl FileFilter for NameExclude {
    fn accept(&self, name: &str) -> bool {
        !self.0.is_match(name)
    }
}

impl FileFilter for ExtensionInclude {
    fn accept(&self, name: &str) -> bool {
        extension_of(name).is_some_and(|ext| ext.eq_ignore_ascii_case(&self.0))
    }
}

impl FileFilter for ExtensionExclude {
    fn accept(&self, name: &str) -> bool {
        !extension_of(name).is_some_and(|ext| ext.eq_ignore_ascii_case(&self.0))
    }
}

impl<A: FileFilter, B: FileFilter> FileFilter for And<A, B> {
    fn accept(&self, name: &str) -> bool {
        self.0.accept(name) && self.1.accept(name)
    }
}

impl<A: FileFilter, B: FileFilter> FileFilter for Or<A, B> {
    fn accept(&self, name: &str) -> bool {
        self.0.accept(name) || self.1.accept(name)
    }
}

impl<A: FileFilter> FileFilter for Not<A> {
    fn accept(&self, name: &str) -> bool {
        !self.0.accept(name)
    }
}

/// Combinators for any [`FileFilter`].
pub trait FilterExt: FileFilter + Sized {
    /// Accepts names both `self` and `other` accept.
    fn and<B: FileFilter>(self, other: B) -> And<Self, B> {
        And(self, other)
    }

    /// Accepts names either `self` or `other` accepts.
    fn or<B: FileFilter>(self, other: B) -> Or<Self, B> {
        Or(self, other)
    }

    /// Accepts names `self` rejects.
    fn not(self) -> Not<Self> {
        Not(self)
    }
}

impl<F: FileFilter> FilterExt for F {}
