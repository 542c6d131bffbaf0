//! Histogram of an id buffer into an ordered priority list.

use std::cmp::Ordering;

use rustc_hash::FxHashMap;
use strata_sector::{Fidelity, ModelId, SectorId};

use crate::encoding::EMPTY_ID;

/// A load candidate produced by coverage ranking.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PriorityEntry {
    pub model: ModelId,
    pub sector: SectorId,
    pub fidelity: Fidelity,
    /// Fraction of the coverage target covered by this sector, in (0, 1].
    pub priority: f32,
}

#[derive(Clone, Copy, Debug)]
struct LookupEntry {
    model: ModelId,
    sector: SectorId,
    has_simple: bool,
}

/// Maps encoded ids back to the sector they were assigned to in one frame.
///
/// Encoded id `n` refers to the `n - 1`th pushed entry.
#[derive(Clone, Debug, Default)]
pub struct IdLookup {
    entries: Vec<LookupEntry>,
}

impl IdLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sector and return its encoded id.
    pub fn push(&mut self, model: ModelId, sector: SectorId, has_simple: bool) -> u32 {
        self.entries.push(LookupEntry {
            model,
            sector,
            has_simple,
        });
        self.entries.len() as u32
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn get(&self, encoded: u32) -> Option<&LookupEntry> {
        let index = encoded.checked_sub(1)?;
        self.entries.get(index as usize)
    }
}

/// Rank the sectors visible in `ids`.
///
/// Sectors with no pixels are omitted. A sector covering at least
/// `detailed_threshold` of the target, or one with no simple payload, is
/// ranked for detailed geometry. Ties order by sector id, then model id.
pub fn rank_ids(ids: &[u32], lookup: &IdLookup, detailed_threshold: f32) -> Vec<PriorityEntry> {
    if ids.is_empty() {
        return Vec::new();
    }

    let mut hits: FxHashMap<u32, u32> = FxHashMap::default();
    for &id in ids {
        if id != EMPTY_ID {
            *hits.entry(id).or_default() += 1;
        }
    }

    let total = ids.len() as f32;
    let mut ranking: Vec<PriorityEntry> = hits
        .into_iter()
        .filter_map(|(encoded, count)| {
            let entry = lookup.get(encoded)?;
            let priority = count as f32 / total;
            let fidelity = if priority >= detailed_threshold || !entry.has_simple {
                Fidelity::Detailed
            } else {
                Fidelity::Simple
            };
            Some(PriorityEntry {
                model: entry.model,
                sector: entry.sector,
                fidelity,
                priority,
            })
        })
        .collect();

    ranking.sort_by(|a, b| {
        b.priority
            .partial_cmp(&a.priority)
            .unwrap_or(Ordering::Equal)
            .then(a.sector.cmp(&b.sector))
            .then(a.model.cmp(&b.model))
    });
    ranking
}
