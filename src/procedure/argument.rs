//! Deferred Procedure Arguments
//!
//! Procedure builders run before any scope exists, so they can only
//! record the raw argument text. The typed value is produced when the
//! step runs and an expander is available.

use std::fmt;

/// A raw argument string with a deferred coercion into `T`.
///
/// # Example
///
/// ```
/// use actionflow::procedure::Argument;
///
/// let verbose = Argument::boolean("${VERBOSE}");
/// assert_eq!(verbose.raw(), "${VERBOSE}");
/// assert!(verbose.value(|_| "TRUE".to_string()));
/// ```
#[derive(Clone)]
pub struct Argument<T> {
    raw: String,
    coerce: fn(String) -> T,
}

impl<T> Argument<T> {
    /// Creates an argument with a custom coercion.
    pub fn new(raw: impl Into<String>, coerce: fn(String) -> T) -> Self {
        Self {
            raw: raw.into(),
            coerce,
        }
    }

    /// The argument exactly as written.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Expands the raw text, then coerces it.
    pub fn value<E>(&self, expander: E) -> T
    where
        E: FnOnce(&str) -> String,
    {
        (self.coerce)(expander(&self.raw))
    }
}

impl Argument<String> {
    /// A plain string argument.
    pub fn string(raw: impl Into<String>) -> Self {
        Self::new(raw, |s| s)
    }
}

impl Argument<bool> {
    /// A flag. `true`, `True`, `TRUE` and `1` are true, anything else false.
    pub fn boolean(raw: impl Into<String>) -> Self {
        Self::new(raw, |s| parse_bool(&s))
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(s, "true" | "1" | "True" | "TRUE")
}

impl<T> fmt::Debug for Argument<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Argument").field(&self.raw).finish()
    }
}
