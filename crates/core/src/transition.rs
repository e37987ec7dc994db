//! Entered/exited computation between two membership snapshots.

use crate::types::RegionSet;
use serde::Serialize;

/// Delta between an old and a new region set.
///
/// `entered` and `exited` are always disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub entered: RegionSet,
    pub exited: RegionSet,
}

impl Transition {
    /// `entered = new \ old`, `exited = old \ new`.
    pub fn between(old: &RegionSet, new: &RegionSet) -> Self {
        Self {
            entered: new.difference(old),
            exited: old.difference(new),
        }
    }

    /// True when the entity neither entered nor left any region.
    pub fn is_empty(&self) -> bool {
        self.entered.is_empty() && self.exited.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set(ids: &[&str]) -> RegionSet {
        ids.iter().copied().collect()
    }

    #[test]
    fn no_movement_is_empty() {
        let s = set(&["R1", "R2"]);
        assert!(Transition::between(&s, &s).is_empty());
    }

    #[test]
    fn from_nothing_enters_everything() {
        let t = Transition::between(&RegionSet::new(), &set(&["A", "B"]));
        assert_eq!(t.entered, set(&["A", "B"]));
        assert!(t.exited.is_empty());
    }

    #[test]
    fn to_nothing_exits_everything() {
        let t = Transition::between(&set(&["A", "B"]), &RegionSet::new());
        assert!(t.entered.is_empty());
        assert_eq!(t.exited, set(&["A", "B"]));
    }

    #[test]
    fn moving_into_overlap() {
        let t = Transition::between(&set(&["R1"]), &set(&["R1", "R2"]));
        assert_eq!(t.entered, set(&["R2"]));
        assert!(t.exited.is_empty());
    }

    #[test]
    fn case_differences_are_distinct_regions() {
        let t = Transition::between(&set(&["zone"]), &set(&["Zone"]));
        assert_eq!(t.entered, set(&["Zone"]));
        assert_eq!(t.exited, set(&["zone"]));
    }

    fn region_set() -> impl Strategy<Value = RegionSet> {
        prop::collection::btree_set("[A-Za-z0-9]{1,4}", 0..8)
            .prop_map(|ids| ids.into_iter().collect::<RegionSet>())
    }

    proptest! {
        #[test]
        fn entered_and_exited_are_disjoint(old in region_set(), new in region_set()) {
            let t = Transition::between(&old, &new);
            prop_assert!(t.entered.iter().all(|r| !t.exited.contains(r)));
        }

        #[test]
        fn transition_partitions_the_union(old in region_set(), new in region_set()) {
            let t = Transition::between(&old, &new);
            for r in old.iter().chain(new.iter()) {
                let kept = old.contains(r) && new.contains(r);
                let hits = [t.entered.contains(r), t.exited.contains(r), kept];
                prop_assert_eq!(hits.iter().filter(|h| **h).count(), 1);
            }
        }
    }
}
