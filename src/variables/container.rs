//! Scope-Chained Variable Container
//!
//! A container is a view over one or more string maps. Lookups walk the
//! chain nearest scope first, so a step variable shadows a job variable
//! with the same key, which in turn shadows an action variable.
//!
//! Values are expanded lazily on [`VariableContainer::get`]: every
//! placeholder is resolved against the whole chain, not only the scope
//! that defined the value.

use std::borrow::Cow;
use std::collections::BTreeMap;

use log::debug;

use super::expand::expand;

/// Flat string-keyed variable map, as stored on actions, jobs and steps.
pub type Variables = BTreeMap<String, String>;

/// A chain of variable scopes.
///
/// # Example
///
/// ```
/// use actionflow::variables::{VariableContainer, Variables};
///
/// let action: Variables = [("who".to_string(), "world".to_string())].into();
/// let step: Variables = [("greeting".to_string(), "hello ${who}".to_string())].into();
///
/// let chain = VariableContainer::borrowed(&step).with_parent(VariableContainer::borrowed(&action));
/// assert_eq!(chain.get("greeting").as_deref(), Some("hello world"));
/// assert_eq!(chain.get_raw("greeting"), Some("hello ${who}"));
/// ```
#[derive(Debug, Clone)]
pub enum VariableContainer<'a> {
    /// A single flat map.
    Map(Cow<'a, Variables>),

    /// `this` shadows `parent`.
    WithParent {
        this: Box<VariableContainer<'a>>,
        parent: Box<VariableContainer<'a>>,
    },

    /// An injected map that takes priority over `base`.
    WithExtra {
        extra: Cow<'a, Variables>,
        base: Box<VariableContainer<'a>>,
    },
}

impl<'a> VariableContainer<'a> {
    /// Creates a scope borrowing an existing map.
    pub fn borrowed(values: &'a Variables) -> Self {
        Self::Map(Cow::Borrowed(values))
    }

    /// Creates a scope owning its map.
    pub fn owned(values: Variables) -> Self {
        Self::Map(Cow::Owned(values))
    }

    /// Creates a scope with no variables.
    pub fn empty() -> Self {
        Self::Map(Cow::Owned(Variables::new()))
    }

    /// Chains `self` in front of `parent`.
    pub fn with_parent(self, parent: VariableContainer<'a>) -> Self {
        Self::WithParent {
            this: Box::new(self),
            parent: Box::new(parent),
        }
    }

    /// Layers `extra` on top of `self`; keys in `extra` win.
    pub fn with_extra(self, extra: Cow<'a, Variables>) -> Self {
        Self::WithExtra {
            extra,
            base: Box::new(self),
        }
    }

    /// Returns the unexpanded value stored for `key`, nearest scope first.
    pub fn get_raw(&self, key: &str) -> Option<&str> {
        match self {
            Self::Map(values) => values.get(key).map(String::as_str),
            Self::WithParent { this, parent } => {
                this.get_raw(key).or_else(|| parent.get_raw(key))
            }
            Self::WithExtra { extra, base } => extra
                .get(key)
                .map(String::as_str)
                .or_else(|| base.get_raw(key)),
        }
    }

    /// Returns the value for `key` with placeholders expanded.
    ///
    /// Unknown placeholders expand to an empty string. A placeholder that
    /// refers back to a key already being expanded (directly or through
    /// other keys) also expands to an empty string.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut path = Vec::new();
        self.get_guarded(key, &mut path)
    }

    /// Expands a free-standing string against this chain.
    pub fn expand(&self, input: &str) -> String {
        self.expand_with(input, |_| None)
    }

    /// Expands `input`, consulting `fallback` for names the chain lacks.
    ///
    /// The fallback result is inserted verbatim, without further expansion.
    pub fn expand_with<F>(&self, input: &str, fallback: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut path = Vec::new();
        expand(input, |name| {
            self.get_guarded(name, &mut path)
                .or_else(|| fallback(name))
                .unwrap_or_default()
        })
    }

    /// Returns every key in the chain with its unexpanded value.
    pub fn list_raw(&self) -> Variables {
        let mut all = Variables::new();
        self.collect_raw(&mut all);
        all
    }

    /// Returns every key in the chain with its expanded value.
    pub fn list_all(&self) -> Variables {
        self.list_raw()
            .into_keys()
            .map(|key| {
                let value = self.get(&key).unwrap_or_default();
                (key, value)
            })
            .collect()
    }

    fn collect_raw(&self, into: &mut Variables) {
        match self {
            Self::Map(values) => {
                for (key, value) in values.iter() {
                    into.insert(key.clone(), value.clone());
                }
            }
            Self::WithParent { this, parent } => {
                parent.collect_raw(into);
                this.collect_raw(into);
            }
            Self::WithExtra { extra, base } => {
                base.collect_raw(into);
                for (key, value) in extra.iter() {
                    into.insert(key.clone(), value.clone());
                }
            }
        }
    }

    fn get_guarded(&self, key: &str, path: &mut Vec<String>) -> Option<String> {
        let raw = self.get_raw(key)?;

        path.push(key.to_string());
        let value = expand(raw, |name| {
            if name == raw || path.iter().any(|seen| seen == name) {
                debug!("Cyclic reference to '{}' expanded to empty string", name);
                return String::new();
            }
            self.get_guarded(name, path).unwrap_or_default()
        });
        path.pop();

        Some(value)
    }
}

impl Default for VariableContainer<'_> {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Variables> for VariableContainer<'_> {
    fn from(values: Variables) -> Self {
        Self::owned(values)
    }
}
