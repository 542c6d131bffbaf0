//! Lifecycle of one sector payload at one fidelity.

use strata_sector::{Fidelity, SectorId};

/// Table key: one sector at one fidelity.
pub type GeometryKey = (SectorId, Fidelity);

/// Where a (sector, fidelity) pair is in its load cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SectorGeometryState {
    #[default]
    NotRequested,
    /// A fetch is in flight. At most one per pair.
    Fetching,
    /// Decoded and about to be handed to the sink.
    Parsed,
    /// Owned by the sink.
    Consumed,
    /// Retired from the sink; may be fetched again.
    Discarded,
}

impl SectorGeometryState {
    /// Whether moving from `self` to `next` is a legal step.
    ///
    /// `Fetching -> NotRequested` covers failed fetches and results dropped
    /// after a release.
    #[must_use]
    pub fn can_transition_to(self, next: SectorGeometryState) -> bool {
        use SectorGeometryState::*;
        matches!(
            (self, next),
            (NotRequested, Fetching)
                | (Fetching, Parsed)
                | (Fetching, NotRequested)
                | (Parsed, Consumed)
                | (Consumed, Discarded)
                | (Discarded, Fetching)
        )
    }

    /// Whether a request for this pair needs a new fetch.
    #[must_use]
    pub fn needs_fetch(self) -> bool {
        matches!(
            self,
            SectorGeometryState::NotRequested | SectorGeometryState::Discarded
        )
    }
}
