//! Fetching, parsing and retiring sector geometry.
//!
//! [`SectorLoadScheduler`] owns the per-(sector, fidelity) state table and is
//! driven from a single update loop. Fetches and parsing run on a small worker
//! pool; results come back over a channel and are applied by
//! [`SectorLoadScheduler::poll`], so geometry sinks only ever see calls from
//! the update loop.

mod error;
mod memory;
mod payload;
mod pool;
mod reporter;
mod scheduler;
mod sink;
mod source;
mod state;

pub use error::{FetchErrorKind, SectorFetchError, SourceError};
pub use memory::{MemoryBudget, select_evictions};
pub use payload::{
    BinaryPayloadParser, MeshVertex, PAYLOAD_MAGIC, PAYLOAD_VERSION, PayloadError, QuadPrimitive,
    SectorGeometry, SectorPayloadParser, encode_detailed, encode_simple,
};
pub use reporter::{ErrorReporter, LogErrorReporter};
pub use scheduler::{
    LoadCandidate, RequestOutcome, SchedulerSettings, SchedulerStats, SectorLoadScheduler,
    UpdateSummary,
};
pub use sink::{CallbackSink, SectorGeometrySink};
pub use source::{FileDataSource, MemoryDataSource, SectorDataSource};
pub use state::{GeometryKey, SectorGeometryState};
