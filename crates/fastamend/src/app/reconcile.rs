//! Reconciling the global selection with per-directory edits.
//!
//! For a focused directory the host UI needs three things: whether an
//! ancestor's recursive selection overrides it, which whole-directory mode
//! (if any) is active, and which individual targets are checked. Edits flow
//! back through [`apply`] and [`toggle_target`], which produce new
//! [`Selection`] values rather than mutating in place.

use std::collections::BTreeSet;

use crate::domain::address::{Address, AddressKind, is_strict_ancestor};
use crate::domain::errors::EditError;
use crate::domain::selection::Selection;

/// Whole-directory selection mode chosen by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryChoice {
    /// No whole-directory entry; individual targets are selectable.
    None,
    Flat,
    Deep,
}

/// Selection state of a focused directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryState {
    /// An `path:` entry is active for the directory.
    Flat,
    /// A `path::` entry is active for the directory.
    Deep,
    /// Only individual targets (possibly none) are selected.
    Targets,
}

/// Everything a directory panel needs to render itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryView {
    pub state: DirectoryState,
    /// The directory sits under an ancestor's recursive selection; its
    /// controls are disabled and its effective selection is "everything".
    pub blocked: bool,
    /// Names of individually checked targets at this directory.
    pub checked: BTreeSet<String>,
}

/// True iff some recursive entry covers a strict ancestor of `dir`.
/// A recursive entry at `dir` itself does not block `dir`.
pub fn blocked_by_parent(dir: &str, selection: &Selection) -> bool {
    selection
        .iter()
        .filter(|entry| entry.kind() == AddressKind::AllDeep)
        .any(|entry| is_strict_ancestor(entry.path(), dir))
}

/// The whole-directory state of `dir`, flat taking precedence over deep.
pub fn state_of(dir: &str, selection: &Selection) -> DirectoryState {
    let mut deep = false;
    for entry in selection.entries_at(dir) {
        match entry.kind() {
            AddressKind::AllFlat => return DirectoryState::Flat,
            AddressKind::AllDeep => deep = true,
            AddressKind::Single => {}
        }
    }
    if deep {
        DirectoryState::Deep
    } else {
        DirectoryState::Targets
    }
}

/// Individually selected target names at exactly `dir`.
pub fn checked_targets(dir: &str, selection: &Selection) -> BTreeSet<String> {
    selection
        .entries_at(dir)
        .filter_map(|entry| entry.target().map(str::to_owned))
        .collect()
}

pub fn view(dir: &str, selection: &Selection) -> DirectoryView {
    DirectoryView {
        state: state_of(dir, selection),
        blocked: blocked_by_parent(dir, selection),
        checked: checked_targets(dir, selection),
    }
}

/// Apply a whole-directory choice at `dir`.
///
/// Every existing entry at exactly `dir` is dropped; Flat and Deep insert
/// their single synthetic entry. Deep also purges entries below `dir`, so
/// the resulting selection stays normalized.
pub fn apply(selection: &Selection, dir: &str, choice: DirectoryChoice) -> Selection {
    let mut next: Selection = selection
        .iter()
        .filter(|entry| entry.path() != dir)
        .cloned()
        .collect();
    match choice {
        DirectoryChoice::None => {}
        DirectoryChoice::Flat => {
            next.insert(Address::all_flat(dir));
        }
        DirectoryChoice::Deep => {
            next.retain(|entry| !is_strict_ancestor(dir, entry.path()));
            next.insert(Address::all_deep(dir));
        }
    }
    next
}

/// Check or uncheck one target at `dir`.
///
/// Only legal while no whole-directory mode is active at `dir` and no
/// ancestor's recursive selection covers it.
pub fn toggle_target(
    selection: &Selection,
    dir: &str,
    target: &str,
    checked: bool,
) -> Result<Selection, EditError> {
    if blocked_by_parent(dir, selection) {
        return Err(EditError::BlockedByParent {
            dir: dir.to_owned(),
        });
    }
    if state_of(dir, selection) != DirectoryState::Targets {
        return Err(EditError::GroupSelectionActive {
            dir: dir.to_owned(),
        });
    }
    let mut next = selection.clone();
    let address = Address::single(dir, target);
    if checked {
        next.insert(address);
    } else {
        next.remove(&address);
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection(entries: &[Address]) -> Selection {
        entries.iter().cloned().collect()
    }

    #[test]
    fn deep_ancestor_blocks_descendants_only() {
        let sel = selection(&[Address::all_deep("a/b")]);
        assert!(blocked_by_parent("a/b/c", &sel));
        assert!(blocked_by_parent("a/b/c/d", &sel));
        assert!(!blocked_by_parent("a/b", &sel));
        assert!(!blocked_by_parent("a", &sel));
        assert!(!blocked_by_parent("a/bc", &sel));
    }

    #[test]
    fn flat_entries_never_block() {
        let sel = selection(&[Address::all_flat("a")]);
        assert!(!blocked_by_parent("a/b", &sel));
    }

    #[test]
    fn flat_takes_precedence_over_deep() {
        let sel = selection(&[Address::all_flat("p"), Address::all_deep("p")]);
        assert_eq!(state_of("p", &sel), DirectoryState::Flat);
    }

    #[test]
    fn single_entries_leave_directory_in_targets_state() {
        let sel = selection(&[Address::single("p", "a"), Address::single("p", "b")]);
        assert_eq!(state_of("p", &sel), DirectoryState::Targets);
        assert_eq!(state_of("empty", &sel), DirectoryState::Targets);

        let panel = view("p", &sel);
        assert!(!panel.blocked);
        assert_eq!(
            panel.checked,
            BTreeSet::from(["a".to_owned(), "b".to_owned()])
        );
    }

    #[test]
    fn apply_replaces_entries_at_the_directory() {
        let sel = selection(&[
            Address::single("p", "a"),
            Address::single("p", "b"),
            Address::single("other", "c"),
        ]);

        let flat = apply(&sel, "p", DirectoryChoice::Flat);
        assert_eq!(flat.entries_at("p").count(), 1);
        assert!(flat.contains(&Address::all_flat("p")));
        assert!(flat.contains(&Address::single("other", "c")));

        let cleared = apply(&flat, "p", DirectoryChoice::None);
        assert_eq!(cleared.entries_at("p").count(), 0);
        assert!(cleared.contains(&Address::single("other", "c")));
    }

    #[test]
    fn apply_deep_purges_descendants() {
        let sel = selection(&[
            Address::single("p/x", "a"),
            Address::all_flat("p/y"),
            Address::single("q", "b"),
        ]);

        let deep = apply(&sel, "p", DirectoryChoice::Deep);
        assert!(deep.is_normalized());
        assert!(deep.contains(&Address::all_deep("p")));
        assert!(deep.contains(&Address::single("q", "b")));
        assert_eq!(deep.len(), 2);
    }

    #[test]
    fn toggle_adds_and_removes_single_targets() {
        let sel = Selection::new();
        let with_target = toggle_target(&sel, "p", "t", true).unwrap();
        assert!(with_target.contains(&Address::single("p", "t")));

        let without = toggle_target(&with_target, "p", "t", false).unwrap();
        assert!(without.is_empty());
    }

    #[test]
    fn toggle_is_rejected_under_group_or_blocked_state() {
        let flat = selection(&[Address::all_flat("p")]);
        assert_eq!(
            toggle_target(&flat, "p", "t", true).unwrap_err(),
            EditError::GroupSelectionActive { dir: "p".into() }
        );

        let blocked = selection(&[Address::all_deep("p")]);
        assert_eq!(
            toggle_target(&blocked, "p/child", "t", true).unwrap_err(),
            EditError::BlockedByParent {
                dir: "p/child".into()
            }
        );
    }
}
