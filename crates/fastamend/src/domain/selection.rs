//! The set of import instructions for a workspace.

use std::collections::BTreeSet;

use crate::domain::address::{Address, AddressKind, is_strict_ancestor};
use crate::domain::errors::ParseError;

/// The complete set of addresses the user wants imported.
///
/// A selection is a value: edits produce new selections rather than
/// mutating shared state, and equality is structural set equality with
/// insertion order irrelevant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    entries: BTreeSet<Address>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one address per non-blank line, as printed by the external
    /// query command. Blank input yields the empty selection; any bad line
    /// fails the whole parse.
    pub fn parse_lines(input: &str) -> Result<Self, ParseError> {
        input
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(Address::parse)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.entries.contains(address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.entries.iter()
    }

    /// Entries whose path is exactly `dir`.
    pub fn entries_at<'a>(&'a self, dir: &'a str) -> impl Iterator<Item = &'a Address> {
        self.entries.iter().filter(move |entry| entry.path() == dir)
    }

    pub fn insert(&mut self, address: Address) -> bool {
        self.entries.insert(address)
    }

    pub fn remove(&mut self, address: &Address) -> bool {
        self.entries.remove(address)
    }

    pub fn retain(&mut self, keep: impl FnMut(&Address) -> bool) {
        self.entries.retain(keep);
    }

    /// Wire form of every entry, in address order.
    pub fn serialized(&self) -> Vec<String> {
        self.entries.iter().map(Address::to_string).collect()
    }

    /// True when no entry is shadowed by a recursive entry above it.
    pub fn is_normalized(&self) -> bool {
        self.entries.iter().all(|entry| {
            !self
                .deep_paths()
                .any(|deep| is_strict_ancestor(deep, entry.path()))
        })
    }

    /// Drop every entry shadowed by a recursive entry on an ancestor
    /// directory.
    pub fn normalized(&self) -> Self {
        let deep: Vec<String> = self.deep_paths().map(str::to_owned).collect();
        let entries = self
            .entries
            .iter()
            .filter(|entry| {
                !deep
                    .iter()
                    .any(|path| is_strict_ancestor(path, entry.path()))
            })
            .cloned()
            .collect();
        Self { entries }
    }

    fn deep_paths(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|entry| entry.kind() == AddressKind::AllDeep)
            .map(Address::path)
    }
}

impl FromIterator<Address> for Selection {
    fn from_iter<I: IntoIterator<Item = Address>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Extend<Address> for Selection {
    fn extend<I: IntoIterator<Item = Address>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}

impl<'a> IntoIterator for &'a Selection {
    type Item = &'a Address;
    type IntoIter = std::collections::btree_set::Iter<'a, Address>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_insertion_order() {
        let a: Selection = [Address::single("x", "a"), Address::all_flat("y")]
            .into_iter()
            .collect();
        let b: Selection = [Address::all_flat("y"), Address::single("x", "a")]
            .into_iter()
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn parses_query_output_lines() {
        let selection = Selection::parse_lines("a:b\nc:\n\nd::\n").unwrap();
        assert_eq!(selection.len(), 3);
        assert!(selection.contains(&Address::single("a", "b")));
        assert!(selection.contains(&Address::all_flat("c")));
        assert!(selection.contains(&Address::all_deep("d")));
    }

    #[test]
    fn blank_output_is_empty_selection() {
        assert!(Selection::parse_lines("").unwrap().is_empty());
        assert!(Selection::parse_lines("\n\n").unwrap().is_empty());
    }

    #[test]
    fn bad_line_fails_the_parse() {
        let err = Selection::parse_lines("a:b\nnot-an-address\n").unwrap_err();
        assert_eq!(err.input, "not-an-address");
    }

    #[test]
    fn normalization_purges_shadowed_descendants() {
        let selection: Selection = [
            Address::all_deep("a"),
            Address::single("a/b", "t"),
            Address::all_flat("a/b/c"),
            Address::single("other", "t"),
        ]
        .into_iter()
        .collect();

        assert!(!selection.is_normalized());
        let normalized = selection.normalized();
        assert!(normalized.is_normalized());
        assert_eq!(normalized.len(), 2);
        assert!(normalized.contains(&Address::all_deep("a")));
        assert!(normalized.contains(&Address::single("other", "t")));
    }

    #[test]
    fn deep_entry_does_not_purge_itself_or_siblings() {
        let selection: Selection = [Address::all_deep("a"), Address::single("ab", "t")]
            .into_iter()
            .collect();
        assert!(selection.is_normalized());
        assert_eq!(selection.normalized(), selection);
    }
}
