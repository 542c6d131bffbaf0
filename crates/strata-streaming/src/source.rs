//! Payload providers.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use rustc_hash::FxHashMap;
use strata_sector::{Fidelity, SectorId};

use crate::error::SourceError;
use crate::state::GeometryKey;

/// Delivers raw sector payloads. Called from fetch worker threads, possibly
/// concurrently for different pairs.
pub trait SectorDataSource: Send + Sync {
    fn fetch_sector_payload(&self, sector: SectorId, fidelity: Fidelity)
    -> Result<Vec<u8>, SourceError>;
}

/// Reads `<root>/sectors/<id>.<fidelity>.bin`.
#[derive(Clone, Debug)]
pub struct FileDataSource {
    root: PathBuf,
}

impl FileDataSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn payload_path(&self, sector: SectorId, fidelity: Fidelity) -> PathBuf {
        self.root
            .join("sectors")
            .join(format!("{sector}.{fidelity}.bin"))
    }
}

impl SectorDataSource for FileDataSource {
    fn fetch_sector_payload(
        &self,
        sector: SectorId,
        fidelity: Fidelity,
    ) -> Result<Vec<u8>, SourceError> {
        let path = self.payload_path(sector, fidelity);
        std::fs::read(&path).map_err(|err| format!("{}: {err}", path.display()).into())
    }
}

/// Payloads held in memory, with a count of fetches served.
#[derive(Debug, Default)]
pub struct MemoryDataSource {
    payloads: FxHashMap<GeometryKey, Vec<u8>>,
    fetches: AtomicUsize,
}

impl MemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, sector: SectorId, fidelity: Fidelity, payload: Vec<u8>) {
        self.payloads.insert((sector, fidelity), payload);
    }

    #[must_use]
    pub fn with_payload(mut self, sector: SectorId, fidelity: Fidelity, payload: Vec<u8>) -> Self {
        self.insert(sector, fidelity, payload);
        self
    }

    /// Number of fetches attempted so far, failed ones included.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl SectorDataSource for MemoryDataSource {
    fn fetch_sector_payload(
        &self,
        sector: SectorId,
        fidelity: Fidelity,
    ) -> Result<Vec<u8>, SourceError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.payloads
            .get(&(sector, fidelity))
            .cloned()
            .ok_or_else(|| format!("no {fidelity} payload for sector {sector}").into())
    }
}
