//! Immutable arena of a model's sectors.
//!
//! Sectors are stored in pre-order with the root at slot 0. Parent and child
//! links are slot indices into the arena, so the tree holds no reference
//! cycles and can be shared read-only across threads once built.

use glam::{Mat4, Vec3};
use rustc_hash::FxHashMap;
use strata_math::{Aabb, Frustum, FrustumTest};

use crate::metadata::{CoverageFactors, FacesFile, IndexFile, ModelMetadata};
use crate::{Fidelity, MetadataCorruptError, SectorId};

/// One node of the sector hierarchy.
#[derive(Clone, Debug)]
pub struct Sector {
    id: SectorId,
    parent_id: Option<SectorId>,
    parent: Option<usize>,
    children: Vec<usize>,
    bounds: Aabb,
    path: String,
    depth: u32,
    estimated_draw_calls: u32,
    index_file: IndexFile,
    faces_file: Option<FacesFile>,
    coverage_factors: CoverageFactors,
}

impl Sector {
    #[must_use]
    pub fn id(&self) -> SectorId {
        self.id
    }

    /// Parent id, `None` for the root.
    #[must_use]
    pub fn parent_id(&self) -> Option<SectorId> {
        self.parent_id
    }

    /// Model-space bounding volume.
    #[must_use]
    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    /// Opaque debugging path from the metadata.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Distance from the root (root is 0).
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    #[must_use]
    pub fn estimated_draw_calls(&self) -> u32 {
        self.estimated_draw_calls
    }

    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    #[must_use]
    pub fn index_file(&self) -> &IndexFile {
        &self.index_file
    }

    #[must_use]
    pub fn faces_file(&self) -> Option<&FacesFile> {
        self.faces_file.as_ref()
    }

    /// Own coverage factors, or those inherited from the nearest ancestor
    /// with a faces file.
    #[must_use]
    pub fn coverage_factors(&self) -> CoverageFactors {
        self.coverage_factors
    }

    /// Whether a simple payload exists for this sector.
    #[must_use]
    pub fn has_simple_geometry(&self) -> bool {
        self.faces_file
            .as_ref()
            .is_some_and(|faces| faces.file_name.is_some())
    }

    /// Advertised payload size for the given fidelity.
    #[must_use]
    pub fn download_size(&self, fidelity: Fidelity) -> u64 {
        match fidelity {
            Fidelity::Detailed => self.index_file.download_size,
            Fidelity::Simple => self.faces_file.as_ref().map_or(0, |f| f.download_size),
        }
    }
}

/// Hierarchical spatial index over one model's sectors.
#[derive(Debug)]
pub struct SectorTree {
    sectors: Vec<Sector>,
    slots: FxHashMap<SectorId, usize>,
    version: u32,
    max_tree_index: u64,
    unit: String,
}

impl SectorTree {
    /// Build and validate a tree from parsed metadata.
    ///
    /// Rejects missing or invalid bounds, duplicate ids, unknown parents,
    /// zero or several roots, and parent cycles.
    pub fn load(metadata: &ModelMetadata) -> Result<Self, MetadataCorruptError> {
        let records = &metadata.sectors;
        if records.is_empty() {
            return Err(MetadataCorruptError::Empty);
        }

        let mut by_id: FxHashMap<SectorId, usize> = FxHashMap::default();
        let mut bounds = Vec::with_capacity(records.len());
        let mut root: Option<(SectorId, usize)> = None;
        for (i, record) in records.iter().enumerate() {
            let id = SectorId(record.id);
            let aabb = record
                .bounding_box
                .ok_or(MetadataCorruptError::MissingBounds { sector: id })?
                .to_aabb();
            if !aabb.is_valid() {
                return Err(MetadataCorruptError::InvalidBounds {
                    sector: id,
                    min: aabb.min,
                    max: aabb.max,
                });
            }
            bounds.push(aabb);
            if by_id.insert(id, i).is_some() {
                return Err(MetadataCorruptError::DuplicateSector { sector: id });
            }
            if record.is_root() {
                if let Some((first, _)) = root {
                    return Err(MetadataCorruptError::MultipleRoots { first, second: id });
                }
                root = Some((id, i));
            }
        }
        let (_, root_record) = root.ok_or(MetadataCorruptError::NoRoot)?;

        let mut children: Vec<Vec<usize>> = vec![Vec::new(); records.len()];
        let mut parents: Vec<Option<usize>> = vec![None; records.len()];
        for (i, record) in records.iter().enumerate() {
            if record.is_root() {
                continue;
            }
            let parent = u32::try_from(record.parent_id)
                .ok()
                .and_then(|p| by_id.get(&SectorId(p)).copied())
                .ok_or(MetadataCorruptError::UnknownParent {
                    sector: SectorId(record.id),
                    parent: record.parent_id,
                })?;
            children[parent].push(i);
            parents[i] = Some(parent);
        }

        // Pre-order walk from the root. Every record has exactly one parent,
        // so anything left unvisited hangs off a parent cycle.
        let mut order = Vec::with_capacity(records.len());
        let mut slot_of: Vec<Option<usize>> = vec![None; records.len()];
        let mut stack = vec![root_record];
        while let Some(i) = stack.pop() {
            slot_of[i] = Some(order.len());
            order.push(i);
            stack.extend(children[i].iter().rev());
        }
        if order.len() < records.len()
            && let Some(i) = slot_of.iter().position(Option::is_none)
        {
            return Err(MetadataCorruptError::Cycle {
                sector: SectorId(records[i].id),
            });
        }

        let slot = |i: usize| slot_of[i].unwrap_or_default();
        let mut sectors: Vec<Sector> = Vec::with_capacity(records.len());
        let mut handed_down: Vec<CoverageFactors> = Vec::with_capacity(records.len());
        for &i in &order {
            let record = &records[i];
            let parent = parents[i].map(slot);
            let (depth, inherited) = match parent {
                Some(p) => (sectors[p].depth + 1, handed_down[p]),
                None => (0, CoverageFactors::default()),
            };
            let (coverage_factors, passes_on) = match &record.faces_file {
                Some(faces) => (faces.coverage_factors, faces.inherited_factors()),
                None => (inherited, inherited),
            };
            handed_down.push(passes_on);
            sectors.push(Sector {
                id: SectorId(record.id),
                parent_id: parent.map(|p| sectors[p].id),
                parent,
                children: children[i].iter().map(|&c| slot(c)).collect(),
                bounds: bounds[i],
                path: record.path.clone(),
                depth,
                estimated_draw_calls: record.estimated_draw_call_count,
                index_file: record.index_file.clone(),
                faces_file: record.faces_file.clone(),
                coverage_factors,
            });
        }

        let slots = sectors
            .iter()
            .enumerate()
            .map(|(slot, sector)| (sector.id, slot))
            .collect();

        tracing::debug!(sectors = sectors.len(), "built sector tree");

        Ok(Self {
            sectors,
            slots,
            version: metadata.version,
            max_tree_index: metadata.max_tree_index,
            unit: metadata.unit.clone().unwrap_or_else(|| "Meters".to_string()),
        })
    }

    /// Parse a metadata document and build the tree.
    pub fn from_json(json: &str) -> Result<Self, MetadataCorruptError> {
        let metadata = ModelMetadata::from_json(json)?;
        Self::load(&metadata)
    }

    #[must_use]
    pub fn root(&self) -> &Sector {
        &self.sectors[0]
    }

    #[must_use]
    pub fn get(&self, id: SectorId) -> Option<&Sector> {
        self.slots.get(&id).map(|&slot| &self.sectors[slot])
    }

    #[must_use]
    pub fn contains(&self, id: SectorId) -> bool {
        self.slots.contains_key(&id)
    }

    /// Number of sectors, always at least one.
    #[must_use]
    pub fn sector_count(&self) -> usize {
        self.sectors.len()
    }

    /// Bounds of the root sector.
    #[must_use]
    pub fn bounds(&self) -> &Aabb {
        &self.root().bounds
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    #[must_use]
    pub fn max_tree_index(&self) -> u64 {
        self.max_tree_index
    }

    #[must_use]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// All sectors in pre-order.
    pub fn iter(&self) -> impl Iterator<Item = &Sector> {
        self.sectors.iter()
    }

    pub fn parent(&self, id: SectorId) -> Option<&Sector> {
        let sector = self.get(id)?;
        sector.parent.map(|p| &self.sectors[p])
    }

    /// Direct children in metadata order. Empty for unknown ids.
    pub fn children(&self, id: SectorId) -> impl Iterator<Item = &Sector> {
        self.get(id)
            .map(|s| s.children.as_slice())
            .unwrap_or_default()
            .iter()
            .map(|&c| &self.sectors[c])
    }

    /// The sector itself followed by each ancestor up to the root.
    /// Empty for unknown ids.
    pub fn ancestors(&self, id: SectorId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.slots.get(&id).copied(),
        }
    }

    /// The sector itself and every descendant, in pre-order.
    /// Empty for unknown ids.
    pub fn descendants(&self, id: SectorId) -> Descendants<'_> {
        Descendants {
            tree: self,
            stack: self.slots.get(&id).copied().into_iter().collect(),
        }
    }

    pub fn leaves(&self) -> impl Iterator<Item = &Sector> {
        self.sectors.iter().filter(|s| s.is_leaf())
    }

    /// Sectors whose bounds contain `point`, parents before children.
    pub fn sectors_containing_point(&self, point: Vec3) -> Vec<&Sector> {
        self.collect_pruned(|aabb| aabb.contains_point(point))
    }

    /// Sectors whose bounds overlap `aabb`, parents before children.
    pub fn sectors_intersecting_box(&self, aabb: &Aabb) -> Vec<&Sector> {
        self.collect_pruned(|bounds| bounds.intersects(aabb))
    }

    /// Sectors at least partially inside the frustum of a model-space
    /// view-projection matrix.
    pub fn sectors_intersecting_frustum(&self, view_projection: &Mat4) -> Vec<&Sector> {
        let frustum = Frustum::from_view_projection(view_projection);
        let mut accepted = Vec::new();
        let mut stack = vec![0];
        while let Some(slot) = stack.pop() {
            let sector = &self.sectors[slot];
            match frustum.classify(&sector.bounds) {
                FrustumTest::Outside => {}
                FrustumTest::Inside => accepted.extend(self.descendants(sector.id)),
                FrustumTest::Intersecting => {
                    accepted.push(sector);
                    stack.extend(sector.children.iter().rev());
                }
            }
        }
        accepted
    }

    /// Pre-order walk that only descends into sectors passing `accept`.
    fn collect_pruned(&self, accept: impl Fn(&Aabb) -> bool) -> Vec<&Sector> {
        let mut accepted = Vec::new();
        let mut stack = vec![0];
        while let Some(slot) = stack.pop() {
            let sector = &self.sectors[slot];
            if accept(&sector.bounds) {
                accepted.push(sector);
                stack.extend(sector.children.iter().rev());
            }
        }
        accepted
    }
}

/// Iterator from a sector up to the root. Clone it to restart.
#[derive(Clone)]
pub struct Ancestors<'a> {
    tree: &'a SectorTree,
    next: Option<usize>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a Sector;

    fn next(&mut self) -> Option<Self::Item> {
        let sector = &self.tree.sectors[self.next?];
        self.next = sector.parent;
        Some(sector)
    }
}

/// Pre-order iterator over a subtree. Clone it to restart.
#[derive(Clone)]
pub struct Descendants<'a> {
    tree: &'a SectorTree,
    stack: Vec<usize>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Sector;

    fn next(&mut self) -> Option<Self::Item> {
        let sector = &self.tree.sectors[self.stack.pop()?];
        self.stack.extend(sector.children.iter().rev());
        Some(sector)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::SectorRecord;

    fn unit_box(offset: f32) -> Aabb {
        Aabb::new(Vec3::splat(offset), Vec3::splat(offset + 1.0))
    }

    /// `1 -> {2 -> {3, 4}, 5, 6 -> {7, 8}}`
    pub(crate) fn fixture_tree() -> SectorTree {
        let parents = [
            (1, None),
            (2, Some(1)),
            (3, Some(2)),
            (4, Some(2)),
            (5, Some(1)),
            (6, Some(1)),
            (7, Some(6)),
            (8, Some(6)),
        ];
        let records = parents
            .iter()
            .map(|&(id, parent)| SectorRecord::new(id, parent, Aabb::new(Vec3::ZERO, Vec3::ONE)))
            .collect();
        SectorTree::load(&ModelMetadata::new(records)).unwrap()
    }

    fn ids<'a>(sectors: impl IntoIterator<Item = &'a Sector>) -> Vec<u32> {
        sectors.into_iter().map(|s| s.id().0).collect()
    }

    fn load(records: Vec<SectorRecord>) -> Result<SectorTree, MetadataCorruptError> {
        SectorTree::load(&ModelMetadata::new(records))
    }

    #[test]
    fn test_root_and_lookup() {
        let tree = fixture_tree();
        assert_eq!(tree.root().id(), SectorId(1));
        assert_eq!(tree.sector_count(), 8);
        assert_eq!(tree.get(SectorId(6)).unwrap().child_count(), 2);
        assert!(tree.get(SectorId(42)).is_none());
        assert_eq!(tree.unit(), "Meters");
    }

    #[test]
    fn test_depth_is_computed_from_hierarchy() {
        let tree = fixture_tree();
        assert_eq!(tree.get(SectorId(1)).unwrap().depth(), 0);
        assert_eq!(tree.get(SectorId(5)).unwrap().depth(), 1);
        assert_eq!(tree.get(SectorId(8)).unwrap().depth(), 2);
    }

    #[test]
    fn test_ancestors_self_to_root() {
        let tree = fixture_tree();
        assert_eq!(ids(tree.ancestors(SectorId(8))), vec![8, 6, 1]);
        assert_eq!(ids(tree.ancestors(SectorId(1))), vec![1]);
        assert!(tree.ancestors(SectorId(99)).next().is_none());
    }

    #[test]
    fn test_descendants_pre_order_and_restartable() {
        let tree = fixture_tree();
        let walk = tree.descendants(SectorId(1));
        assert_eq!(ids(walk.clone()), vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(ids(walk), vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(ids(tree.descendants(SectorId(6))), vec![6, 7, 8]);
        assert_eq!(ids(tree.children(SectorId(2))), vec![3, 4]);
        assert_eq!(ids(tree.leaves()), vec![3, 4, 5, 7, 8]);
    }

    #[test]
    fn test_children_listed_before_parent_still_load() {
        let tree = load(vec![
            SectorRecord::new(3, Some(2), unit_box(0.0)),
            SectorRecord::new(2, Some(1), unit_box(0.0)),
            SectorRecord::new(1, None, unit_box(0.0)),
        ])
        .unwrap();
        assert_eq!(ids(tree.iter()), vec![1, 2, 3]);
        assert_eq!(tree.parent(SectorId(3)).unwrap().id(), SectorId(2));
    }

    #[test]
    fn test_rejects_cycle() {
        let err = load(vec![
            SectorRecord::new(0, None, unit_box(0.0)),
            SectorRecord::new(1, Some(2), unit_box(0.0)),
            SectorRecord::new(2, Some(1), unit_box(0.0)),
        ])
        .unwrap_err();
        assert!(matches!(err, MetadataCorruptError::Cycle { sector } if sector == SectorId(1)));
    }

    #[test]
    fn test_rejects_self_parent() {
        let err = load(vec![
            SectorRecord::new(0, None, unit_box(0.0)),
            SectorRecord::new(1, Some(1), unit_box(0.0)),
        ])
        .unwrap_err();
        assert!(matches!(err, MetadataCorruptError::Cycle { .. }));
    }

    #[test]
    fn test_rejects_structural_errors() {
        assert!(matches!(load(vec![]), Err(MetadataCorruptError::Empty)));
        assert!(matches!(
            load(vec![SectorRecord::new(1, Some(0), unit_box(0.0))]),
            Err(MetadataCorruptError::UnknownParent { parent: 0, .. })
        ));
        assert!(matches!(
            load(vec![
                SectorRecord::new(0, None, unit_box(0.0)),
                SectorRecord::new(1, None, unit_box(0.0)),
            ]),
            Err(MetadataCorruptError::MultipleRoots { .. })
        ));
        assert!(matches!(
            load(vec![
                SectorRecord::new(0, None, unit_box(0.0)),
                SectorRecord::new(0, Some(0), unit_box(0.0)),
            ]),
            Err(MetadataCorruptError::DuplicateSector { .. })
        ));
        let mut orphan_loop = vec![
            SectorRecord::new(1, Some(2), unit_box(0.0)),
            SectorRecord::new(2, Some(1), unit_box(0.0)),
        ];
        assert!(matches!(load(orphan_loop.clone()), Err(MetadataCorruptError::NoRoot)));
        orphan_loop[0].parent_id = i64::from(u32::MAX) + 1;
        orphan_loop.push(SectorRecord::new(0, None, unit_box(0.0)));
        assert!(matches!(
            load(orphan_loop),
            Err(MetadataCorruptError::UnknownParent { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_bounds() {
        let mut missing = SectorRecord::new(0, None, unit_box(0.0));
        missing.bounding_box = None;
        assert!(matches!(
            load(vec![missing]),
            Err(MetadataCorruptError::MissingBounds { .. })
        ));

        let inverted = SectorRecord::new(0, None, Aabb::new(Vec3::ONE, Vec3::ZERO));
        assert!(matches!(
            load(vec![inverted]),
            Err(MetadataCorruptError::InvalidBounds { .. })
        ));

        let json = r#"{ "sectors": [ { "id": 0, "boundingBox": {
            "min": { "x": 0, "y": null, "z": 0 }, "max": { "x": 1, "y": 1, "z": 1 } } } ] }"#;
        assert!(matches!(
            SectorTree::from_json(json),
            Err(MetadataCorruptError::InvalidBounds { .. })
        ));
    }

    #[test]
    fn test_from_json_reports_parse_error() {
        assert!(matches!(
            SectorTree::from_json("{ not json"),
            Err(MetadataCorruptError::Json(_))
        ));
    }

    #[test]
    fn test_coverage_factors_inherited_from_ancestor() {
        let mut root = SectorRecord::new(0, None, unit_box(0.0)).with_faces(0.5, 10);
        if let Some(faces) = root.faces_file.as_mut() {
            faces.recursive_coverage_factors = Some(CoverageFactors {
                xy: 0.9,
                yz: 0.8,
                xz: 0.7,
            });
        }
        let tree = load(vec![
            root,
            SectorRecord::new(1, Some(0), unit_box(0.0)),
            SectorRecord::new(2, Some(1), unit_box(0.0)),
            SectorRecord::new(3, Some(0), unit_box(0.0)).with_faces(0.1, 10),
        ])
        .unwrap();

        assert_eq!(tree.get(SectorId(0)).unwrap().coverage_factors().xy, 0.5);
        assert_eq!(tree.get(SectorId(1)).unwrap().coverage_factors().xy, 0.9);
        assert_eq!(tree.get(SectorId(2)).unwrap().coverage_factors().xz, 0.7);
        assert_eq!(tree.get(SectorId(3)).unwrap().coverage_factors().xy, 0.1);
        assert!(!tree.get(SectorId(2)).unwrap().has_simple_geometry());
        assert!(tree.get(SectorId(3)).unwrap().has_simple_geometry());
        assert_eq!(tree.get(SectorId(3)).unwrap().download_size(Fidelity::Simple), 10);
    }

    #[test]
    fn test_spatial_queries_prune_subtrees() {
        let tree = load(vec![
            SectorRecord::new(0, None, Aabb::new(Vec3::ZERO, Vec3::splat(4.0))),
            SectorRecord::new(1, Some(0), Aabb::new(Vec3::ZERO, Vec3::splat(2.0))),
            SectorRecord::new(2, Some(0), Aabb::new(Vec3::splat(2.0), Vec3::splat(4.0))),
            SectorRecord::new(3, Some(1), Aabb::new(Vec3::ZERO, Vec3::ONE)),
            // Lies inside 2's volume but is only reachable through 1.
            SectorRecord::new(4, Some(1), Aabb::new(Vec3::splat(3.0), Vec3::splat(3.5))),
        ])
        .unwrap();

        assert_eq!(ids(tree.sectors_containing_point(Vec3::splat(0.5))), vec![0, 1, 3]);
        assert_eq!(ids(tree.sectors_containing_point(Vec3::splat(3.2))), vec![0, 2]);
        assert!(tree.sectors_containing_point(Vec3::splat(10.0)).is_empty());

        let query = Aabb::new(Vec3::splat(1.5), Vec3::splat(2.5));
        assert_eq!(ids(tree.sectors_intersecting_box(&query)), vec![0, 1, 2]);
    }

    #[test]
    fn test_frustum_query() {
        let tree = load(vec![
            SectorRecord::new(0, None, Aabb::new(Vec3::new(-50.0, -1.0, -50.0), Vec3::new(50.0, 1.0, 50.0))),
            SectorRecord::new(1, Some(0), Aabb::new(Vec3::new(-1.0, -1.0, -6.0), Vec3::new(1.0, 1.0, -4.0))),
            SectorRecord::new(2, Some(0), Aabb::new(Vec3::new(-1.0, -1.0, 4.0), Vec3::new(1.0, 1.0, 6.0))),
            SectorRecord::new(3, Some(1), Aabb::new(Vec3::new(-0.5, -0.5, -5.5), Vec3::new(0.5, 0.5, -4.5))),
        ])
        .unwrap();
        let view = Mat4::look_to_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 1000.0, 0.1);

        assert_eq!(ids(tree.sectors_intersecting_frustum(&(proj * view))), vec![0, 1, 3]);
    }
}
