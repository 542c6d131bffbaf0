use std::fmt;

use strata_sector::{Fidelity, SectorId};

/// Boxed failure returned by data sources and carried as a fetch cause.
pub type SourceError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Stage at which a sector fetch failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// The data source could not deliver the payload.
    Source,
    /// The payload arrived but could not be decoded.
    Parse,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FetchErrorKind::Source => "fetch",
            FetchErrorKind::Parse => "parse",
        })
    }
}

/// A sector payload could not be made resident. Recoverable: the pair
/// returns to `NotRequested` and may be requested again.
#[derive(Debug, thiserror::Error)]
#[error("failed to {kind} {fidelity} payload of sector {sector}: {cause}")]
pub struct SectorFetchError {
    pub kind: FetchErrorKind,
    pub sector: SectorId,
    pub fidelity: Fidelity,
    #[source]
    pub cause: SourceError,
}

impl SectorFetchError {
    pub fn new(
        kind: FetchErrorKind,
        sector: SectorId,
        fidelity: Fidelity,
        cause: impl Into<SourceError>,
    ) -> Self {
        Self {
            kind,
            sector,
            fidelity,
            cause: cause.into(),
        }
    }
}
