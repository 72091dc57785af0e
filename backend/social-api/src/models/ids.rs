//! Identifier normalization and membership.
//!
//! Identifiers reach the service in several textual shapes: token subjects,
//! path segments, form fields. They are all funneled through
//! [`canonical_id`] before they are compared with anything the store returned,
//! and every "is X in this collection" question goes through [`IdSet`].

use std::collections::HashSet;
use uuid::Uuid;

/// Parse any accepted textual form of an identifier into its canonical value.
///
/// Hyphenated, simple (32 hex digits), braced and `urn:uuid:` forms are
/// accepted in either case. Surrounding whitespace is ignored.
pub fn canonical_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw.trim()).ok()
}

/// Order- and duplicate-insensitive set of identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdSet(HashSet<Uuid>);

impl IdSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.0.contains(id)
    }

    pub fn insert(&mut self, id: Uuid) -> bool {
        self.0.insert(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Uuid> {
        self.0.iter()
    }

    /// Build a set from raw strings, dropping anything that is not an identifier.
    pub fn from_raw<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        raw.into_iter()
            .filter_map(|s| canonical_id(s.as_ref()))
            .collect()
    }
}

impl FromIterator<Uuid> for IdSet {
    fn from_iter<T: IntoIterator<Item = Uuid>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<&'a Uuid> for IdSet {
    fn from_iter<T: IntoIterator<Item = &'a Uuid>>(iter: T) -> Self {
        Self(iter.into_iter().copied().collect())
    }
}

/// Membership over a stored sequence, with set semantics.
pub fn contains_id(haystack: &[Uuid], needle: &Uuid) -> bool {
    haystack.iter().any(|id| id == needle)
}
