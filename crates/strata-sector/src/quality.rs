//! Detailed/simple classification of a sector tree.
//!
//! A sector is detailed when its own detailed geometry is resident or when
//! any descendant's is: a detailed sector drags its whole ancestor chain to
//! detailed so no high-fidelity island floats inside coarse surroundings.
//! Every other sector is simple.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use crate::{Fidelity, SectorId, SectorTree};

/// Result of [`resolve_quality`]: one fidelity for every sector in the tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Classification {
    fidelity: FxHashMap<SectorId, Fidelity>,
    detailed: BTreeSet<SectorId>,
    simple: BTreeSet<SectorId>,
}

impl Classification {
    /// Fidelity of a sector, `None` only for ids outside the tree.
    #[must_use]
    pub fn fidelity(&self, id: SectorId) -> Option<Fidelity> {
        self.fidelity.get(&id).copied()
    }

    #[must_use]
    pub fn is_detailed(&self, id: SectorId) -> bool {
        self.detailed.contains(&id)
    }

    /// Every detailed sector, ascending.
    #[must_use]
    pub fn detailed(&self) -> &BTreeSet<SectorId> {
        &self.detailed
    }

    /// The simple sectors to draw: the root when nothing is detailed, else
    /// each non-detailed child of a detailed sector. Simple sectors below
    /// these are already covered by their ancestor's simple geometry.
    #[must_use]
    pub fn simple(&self) -> &BTreeSet<SectorId> {
        &self.simple
    }

    /// Number of classified sectors (the tree's sector count).
    #[must_use]
    pub fn len(&self) -> usize {
        self.fidelity.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fidelity.is_empty()
    }
}

/// Classify every sector given the ids whose detailed geometry is resident.
///
/// Ids not present in the tree are ignored. The result depends only on the
/// set of ids, not on their order or multiplicity, and feeding
/// [`Classification::detailed`] back in reproduces the same classification.
pub fn resolve_quality(
    tree: &SectorTree,
    detailed_ids: impl IntoIterator<Item = SectorId>,
) -> Classification {
    let mut detailed = BTreeSet::new();
    for id in detailed_ids {
        for sector in tree.ancestors(id) {
            // Everything above an already-marked sector is marked too.
            if !detailed.insert(sector.id()) {
                break;
            }
        }
    }

    let mut simple = BTreeSet::new();
    if detailed.is_empty() {
        simple.insert(tree.root().id());
    } else {
        for &id in &detailed {
            simple.extend(
                tree.children(id)
                    .map(|child| child.id())
                    .filter(|child| !detailed.contains(child)),
            );
        }
    }

    let fidelity = tree
        .iter()
        .map(|sector| {
            let fidelity = if detailed.contains(&sector.id()) {
                Fidelity::Detailed
            } else {
                Fidelity::Simple
            };
            (sector.id(), fidelity)
        })
        .collect();

    Classification {
        fidelity,
        detailed,
        simple,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::tests::fixture_tree;

    fn set(ids: &[u32]) -> BTreeSet<SectorId> {
        ids.iter().copied().map(SectorId).collect()
    }

    fn check(detailed_in: &[u32], simple: &[u32], detailed: &[u32]) {
        let tree = fixture_tree();
        let classification = resolve_quality(&tree, detailed_in.iter().copied().map(SectorId));
        assert_eq!(classification.simple(), &set(simple), "simple for D={detailed_in:?}");
        assert_eq!(classification.detailed(), &set(detailed), "detailed for D={detailed_in:?}");
    }

    #[test]
    fn test_fixture_classifications() {
        check(&[], &[1], &[]);
        check(&[1], &[2, 5, 6], &[1]);
        check(&[8], &[2, 5, 7], &[1, 6, 8]);
        check(&[5], &[2, 6], &[1, 5]);
        check(&[2, 7], &[3, 4, 5, 8], &[1, 2, 6, 7]);
        check(&[1, 2, 3, 4, 5, 6, 7, 8], &[], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_empty_input_is_all_simple() {
        let tree = fixture_tree();
        let classification = resolve_quality(&tree, []);
        assert_eq!(classification.len(), tree.sector_count());
        for sector in tree.iter() {
            assert_eq!(classification.fidelity(sector.id()), Some(Fidelity::Simple));
        }
    }

    #[test]
    fn test_every_sector_has_exactly_one_fidelity() {
        let tree = fixture_tree();
        let classification = resolve_quality(&tree, [SectorId(3), SectorId(8)]);
        for sector in tree.iter() {
            let fidelity = classification.fidelity(sector.id()).unwrap();
            assert_eq!(fidelity == Fidelity::Detailed, classification.is_detailed(sector.id()));
        }
        assert_eq!(classification.fidelity(SectorId(99)), None);
    }

    #[test]
    fn test_ancestor_closure() {
        let tree = fixture_tree();
        for leaf in tree.leaves() {
            let classification = resolve_quality(&tree, [leaf.id()]);
            for ancestor in tree.ancestors(leaf.id()) {
                assert!(classification.is_detailed(ancestor.id()));
            }
        }
    }

    #[test]
    fn test_unknown_ids_are_ignored() {
        let tree = fixture_tree();
        let with_unknown = resolve_quality(&tree, [SectorId(7), SectorId(404)]);
        let without = resolve_quality(&tree, [SectorId(7)]);
        assert_eq!(with_unknown, without);
    }

    #[test]
    fn test_idempotent_and_order_independent() {
        let tree = fixture_tree();
        let first = resolve_quality(&tree, [SectorId(8), SectorId(3), SectorId(8)]);
        let reversed = resolve_quality(&tree, [SectorId(3), SectorId(8)]);
        assert_eq!(first, reversed);

        let again = resolve_quality(&tree, first.detailed().iter().copied());
        assert_eq!(again, first);
    }
}
