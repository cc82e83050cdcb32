//! Keyed list diffing, independent of any document.

use std::collections::{HashMap, HashSet};

/// One row's identity and content: both are value fingerprints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyed {
    pub key: String,
    pub print: String,
}

impl Keyed {
    pub fn new(key: impl Into<String>, print: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            print: print.into(),
        }
    }
}

/// What happens at one position of the new list. Indices point into the rows
/// that survive removal, in their previous order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Same key, same position, same content. Nothing runs.
    Keep(usize),
    /// Existing row that moved or whose item changed; it is revisited.
    Patch(usize),
    Create,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    /// Old indices whose keys are gone.
    pub removed: Vec<usize>,
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn creates(&self) -> usize {
        self.steps.iter().filter(|s| matches!(s, Step::Create)).count()
    }

    pub fn patches(&self) -> usize {
        self.steps.iter().filter(|s| matches!(s, Step::Patch(_))).count()
    }

    pub fn keeps(&self) -> usize {
        self.steps.iter().filter(|s| matches!(s, Step::Keep(_))).count()
    }
}

/// Returned when the new list repeats a key. Carries the repeated key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateKey(pub String);

/// Diff `old` against `new`. Rows are compared against the post-removal
/// sequence positionally, so a pure removal keeps every survivor untouched.
pub fn plan(old: &[Keyed], new: &[Keyed]) -> Result<Plan, DuplicateKey> {
    let mut wanted = HashSet::with_capacity(new.len());
    for entry in new {
        if !wanted.insert(entry.key.as_str()) {
            return Err(DuplicateKey(entry.key.clone()));
        }
    }

    let mut removed = Vec::new();
    let mut retained = Vec::with_capacity(old.len());
    for (i, entry) in old.iter().enumerate() {
        if wanted.contains(entry.key.as_str()) {
            retained.push(entry);
        } else {
            removed.push(i);
        }
    }
    let position: HashMap<&str, usize> = retained
        .iter()
        .enumerate()
        .map(|(i, entry)| (entry.key.as_str(), i))
        .collect();

    let steps = new
        .iter()
        .enumerate()
        .map(|(i, entry)| match position.get(entry.key.as_str()) {
            Some(&at) if at == i && retained[at].print == entry.print => Step::Keep(at),
            Some(&at) => Step::Patch(at),
            None => Step::Create,
        })
        .collect();

    Ok(Plan { removed, steps })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(keys: &[&str]) -> Vec<Keyed> {
        keys.iter().map(|k| Keyed::new(*k, format!("item-{k}"))).collect()
    }

    #[test]
    fn unchanged_list_keeps_everything() {
        let old = rows(&["a", "b", "c"]);
        let p = plan(&old, &old).unwrap();
        assert!(p.removed.is_empty());
        assert_eq!(p.steps, vec![Step::Keep(0), Step::Keep(1), Step::Keep(2)]);
    }

    #[test]
    fn swap_patches_only_the_moved_rows() {
        let p = plan(&rows(&["a", "b", "c"]), &rows(&["c", "b", "a"])).unwrap();
        assert_eq!(p.steps, vec![Step::Patch(2), Step::Keep(1), Step::Patch(0)]);
        assert_eq!(p.creates(), 0);
    }

    #[test]
    fn removal_leaves_survivors_in_place() {
        let p = plan(&rows(&["a", "b", "c"]), &rows(&["a", "c"])).unwrap();
        assert_eq!(p.removed, vec![1]);
        assert_eq!(p.steps, vec![Step::Keep(0), Step::Keep(1)]);
    }

    #[test]
    fn new_keys_are_created_and_changed_items_patched() {
        let old = rows(&["a", "b"]);
        let new = vec![Keyed::new("a", "item-a"), Keyed::new("b", "edited"), Keyed::new("z", "item-z")];
        let p = plan(&old, &new).unwrap();
        assert_eq!(p.steps, vec![Step::Keep(0), Step::Patch(1), Step::Create]);
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let err = plan(&[], &rows(&["a", "b", "a"])).unwrap_err();
        assert_eq!(err, DuplicateKey("a".into()));
    }
}
