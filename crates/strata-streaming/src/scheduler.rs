//! The per-model load state machine and its per-tick update.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rustc_hash::{FxHashMap, FxHashSet};
use strata_sector::{Fidelity, ModelId, SectorId, SectorTree};

use crate::memory::{MemoryBudget, select_evictions};
use crate::payload::{BinaryPayloadParser, SectorPayloadParser};
use crate::pool::{FetchCompletion, FetchJob, FetchOutcome, FetchPool};
use crate::reporter::{ErrorReporter, LogErrorReporter};
use crate::sink::SectorGeometrySink;
use crate::source::SectorDataSource;
use crate::state::{GeometryKey, SectorGeometryState};

/// Scheduler tunables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Fetch worker threads; 0 derives a count from the CPU.
    pub worker_threads: usize,
    /// Cap on fetches in flight. Ranked pairs beyond it wait for a later tick.
    pub max_concurrent_fetches: usize,
    /// How many ranked entries are considered each update.
    pub request_budget: usize,
    /// Updates a pair may stay out of the ranking before it is released.
    pub release_grace_ticks: u64,
    pub memory_budget_bytes: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            max_concurrent_fetches: 20,
            request_budget: 50,
            release_grace_ticks: 30,
            memory_budget_bytes: 512 * 1024 * 1024,
        }
    }
}

impl SchedulerSettings {
    #[must_use]
    pub fn effective_workers(&self) -> usize {
        if self.worker_threads > 0 {
            return self.worker_threads;
        }
        num_cpus::get()
            .saturating_sub(1)
            .clamp(1, self.max_concurrent_fetches.max(1))
    }
}

/// One ranked load candidate for this scheduler's model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoadCandidate {
    pub sector: SectorId,
    pub fidelity: Fidelity,
    pub priority: f32,
}

/// What [`SectorLoadScheduler::request`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestOutcome {
    /// A new fetch was issued.
    Issued,
    /// A fetch for the pair was already in flight.
    Joined,
    /// The pair is already parsed or consumed.
    AlreadyAvailable,
    UnknownSector,
    /// The worker pool is shut down.
    Rejected,
}

/// Cumulative counters. Evictions are also counted as releases.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub issued: u64,
    pub joined: u64,
    pub consumed: u64,
    /// Results that arrived after their pair was released.
    pub dropped: u64,
    pub failed: u64,
    pub released: u64,
    pub evicted: u64,
}

impl SchedulerStats {
    /// Counter growth since an earlier snapshot.
    #[must_use]
    pub fn since(&self, earlier: &SchedulerStats) -> SchedulerStats {
        SchedulerStats {
            issued: self.issued - earlier.issued,
            joined: self.joined - earlier.joined,
            consumed: self.consumed - earlier.consumed,
            dropped: self.dropped - earlier.dropped,
            failed: self.failed - earlier.failed,
            released: self.released - earlier.released,
            evicted: self.evicted - earlier.evicted,
        }
    }
}

/// What one [`SectorLoadScheduler::update`] call did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub requested: usize,
    pub joined: usize,
    /// Wanted pairs left for a later tick by the concurrency cap.
    pub deferred: usize,
    pub released: usize,
    pub evicted: usize,
}

#[derive(Debug, Default)]
struct PairEntry {
    state: SectorGeometryState,
    /// Released while fetching; the result is dropped on arrival.
    released: bool,
    cancelled: Option<Arc<AtomicBool>>,
    last_wanted_tick: u64,
    priority: f32,
}

impl PairEntry {
    fn set_state(&mut self, key: GeometryKey, next: SectorGeometryState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {:?} -> {next:?} for {key:?}",
            self.state
        );
        tracing::trace!(sector = %key.0, fidelity = %key.1, from = ?self.state, to = ?next, "sector state");
        self.state = next;
    }

    fn reset(&mut self, key: GeometryKey) {
        self.released = false;
        self.cancelled = None;
        self.set_state(key, SectorGeometryState::NotRequested);
    }
}

/// Loads and retires sector geometry for one model.
pub struct SectorLoadScheduler {
    model: ModelId,
    tree: Arc<SectorTree>,
    settings: SchedulerSettings,
    pool: FetchPool,
    sink: Box<dyn SectorGeometrySink>,
    reporter: Arc<dyn ErrorReporter>,
    pairs: FxHashMap<GeometryKey, PairEntry>,
    memory: MemoryBudget,
    tick: u64,
    stats: SchedulerStats,
}

impl SectorLoadScheduler {
    /// Scheduler decoding payloads with [`BinaryPayloadParser`].
    pub fn new(
        model: ModelId,
        tree: Arc<SectorTree>,
        source: Arc<dyn SectorDataSource>,
        sink: Box<dyn SectorGeometrySink>,
        settings: SchedulerSettings,
    ) -> std::io::Result<Self> {
        Self::with_parser(model, tree, source, Arc::new(BinaryPayloadParser), sink, settings)
    }

    pub fn with_parser(
        model: ModelId,
        tree: Arc<SectorTree>,
        source: Arc<dyn SectorDataSource>,
        parser: Arc<dyn SectorPayloadParser>,
        sink: Box<dyn SectorGeometrySink>,
        settings: SchedulerSettings,
    ) -> std::io::Result<Self> {
        let pool = FetchPool::new(settings.effective_workers(), source, parser)?;
        tracing::debug!(%model, workers = pool.worker_count(), "started sector fetch pool");
        Ok(Self {
            model,
            tree,
            settings,
            pool,
            sink,
            reporter: Arc::new(LogErrorReporter),
            pairs: FxHashMap::default(),
            memory: MemoryBudget::new(settings.memory_budget_bytes),
            tick: 0,
            stats: SchedulerStats::default(),
        })
    }

    pub fn set_reporter(&mut self, reporter: Arc<dyn ErrorReporter>) {
        self.reporter = reporter;
    }

    /// Replace the geometry sink, returning the previous one.
    pub fn set_sink(&mut self, sink: Box<dyn SectorGeometrySink>) -> Box<dyn SectorGeometrySink> {
        std::mem::replace(&mut self.sink, sink)
    }

    pub fn model(&self) -> ModelId {
        self.model
    }

    pub fn tree(&self) -> &Arc<SectorTree> {
        &self.tree
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Number of completed [`update`](Self::update) calls.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    #[must_use]
    pub fn state(&self, sector: SectorId, fidelity: Fidelity) -> SectorGeometryState {
        self.pairs
            .get(&(sector, fidelity))
            .map_or(SectorGeometryState::NotRequested, |entry| entry.state)
    }

    /// Pairs with a fetch in flight, released ones included.
    pub fn fetching_count(&self) -> usize {
        self.count_in(SectorGeometryState::Fetching)
    }

    pub fn resident_count(&self) -> usize {
        self.count_in(SectorGeometryState::Consumed)
    }

    pub fn resident_bytes(&self) -> usize {
        self.memory.total_bytes()
    }

    /// Sectors whose detailed geometry is consumed, ascending.
    #[must_use]
    pub fn resident_detailed_ids(&self) -> Vec<SectorId> {
        let mut ids: Vec<SectorId> = self
            .pairs
            .iter()
            .filter(|((_, fidelity), entry)| {
                *fidelity == Fidelity::Detailed && entry.state == SectorGeometryState::Consumed
            })
            .map(|((sector, _), _)| *sector)
            .collect();
        ids.sort_unstable();
        ids
    }

    fn count_in(&self, state: SectorGeometryState) -> usize {
        self.pairs.values().filter(|e| e.state == state).count()
    }

    /// Make a pair resident, issuing at most one fetch for it.
    pub fn request(&mut self, sector: SectorId, fidelity: Fidelity) -> RequestOutcome {
        if !self.tree.contains(sector) {
            return RequestOutcome::UnknownSector;
        }
        let key = (sector, fidelity);
        let tick = self.tick;
        let entry = self.pairs.entry(key).or_default();
        entry.last_wanted_tick = tick;
        let state = entry.state;

        match state {
            SectorGeometryState::Fetching => {
                entry.released = false;
                if let Some(cancelled) = &entry.cancelled {
                    cancelled.store(false, Ordering::Relaxed);
                }
                self.stats.joined += 1;
                RequestOutcome::Joined
            }
            SectorGeometryState::Parsed | SectorGeometryState::Consumed => {
                RequestOutcome::AlreadyAvailable
            }
            SectorGeometryState::NotRequested | SectorGeometryState::Discarded => {
                if self.submit(key) {
                    if let Some(entry) = self.pairs.get_mut(&key) {
                        entry.set_state(key, SectorGeometryState::Fetching);
                    }
                    self.stats.issued += 1;
                    RequestOutcome::Issued
                } else {
                    RequestOutcome::Rejected
                }
            }
        }
    }

    /// Retire a pair. A consumed pair is discarded from the sink; a pair
    /// still fetching has its eventual result dropped. Returns whether
    /// anything was released.
    pub fn release(&mut self, sector: SectorId, fidelity: Fidelity) -> bool {
        let key = (sector, fidelity);
        let Some(entry) = self.pairs.get_mut(&key) else {
            return false;
        };
        match entry.state {
            SectorGeometryState::Fetching if !entry.released => {
                entry.released = true;
                if let Some(cancelled) = &entry.cancelled {
                    cancelled.store(true, Ordering::Relaxed);
                }
            }
            SectorGeometryState::Consumed => {
                entry.set_state(key, SectorGeometryState::Discarded);
                self.sink.discard(sector, fidelity);
                self.memory.on_released(&key);
            }
            _ => return false,
        }
        tracing::debug!(model = %self.model, %sector, %fidelity, "released sector");
        self.stats.released += 1;
        true
    }

    /// Release every pair. Used when the model is unloaded.
    pub fn release_all(&mut self) -> usize {
        let mut keys: Vec<GeometryKey> = self.pairs.keys().copied().collect();
        keys.sort_unstable();
        keys.into_iter()
            .filter(|&(sector, fidelity)| self.release(sector, fidelity))
            .count()
    }

    /// Apply every completion that has arrived. Never blocks.
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        while let Some(completion) = self.pool.try_recv() {
            self.complete(completion);
            handled += 1;
        }
        handled
    }

    /// Wait up to `timeout` for at least one completion, then apply all that
    /// have arrived.
    pub fn wait_for_completions(&mut self, timeout: Duration) -> usize {
        if self.fetching_count() == 0 {
            return self.poll();
        }
        match self.pool.recv_timeout(timeout) {
            Some(completion) => {
                self.complete(completion);
                1 + self.poll()
            }
            None => 0,
        }
    }

    /// Apply completions until no fetch is in flight. Returns `false` if
    /// `timeout` elapsed first.
    pub fn wait_until_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.fetching_count() > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            self.wait_for_completions(remaining);
        }
        true
    }

    /// Follow a new ranking: request the top entries within the concurrency
    /// cap, release pairs unranked for longer than the grace period, then
    /// evict to the memory budget. Pairs ranked this update are never
    /// released by it.
    pub fn update(&mut self, candidates: &[LoadCandidate]) -> UpdateSummary {
        self.tick += 1;
        let tick = self.tick;
        let mut summary = UpdateSummary::default();
        let mut wanted: FxHashSet<GeometryKey> = FxHashSet::default();
        let mut fetching = self.fetching_count();

        for candidate in candidates.iter().take(self.settings.request_budget) {
            let key = (candidate.sector, candidate.fidelity);
            if !self.tree.contains(candidate.sector) || !wanted.insert(key) {
                continue;
            }
            let entry = self.pairs.entry(key).or_default();
            entry.last_wanted_tick = tick;
            entry.priority = candidate.priority;
            let state = entry.state;
            let rejoin = state == SectorGeometryState::Fetching && entry.released;

            if state.needs_fetch() {
                if fetching >= self.settings.max_concurrent_fetches {
                    summary.deferred += 1;
                    continue;
                }
                if self.request(candidate.sector, candidate.fidelity) == RequestOutcome::Issued {
                    fetching += 1;
                    summary.requested += 1;
                }
            } else if rejoin {
                self.request(candidate.sector, candidate.fidelity);
                summary.joined += 1;
            }
        }

        let grace = self.settings.release_grace_ticks;
        let mut stale: Vec<GeometryKey> = self
            .pairs
            .iter()
            .filter(|(key, entry)| {
                let live = entry.state == SectorGeometryState::Consumed
                    || (entry.state == SectorGeometryState::Fetching && !entry.released);
                live && !wanted.contains(*key) && tick - entry.last_wanted_tick > grace
            })
            .map(|(key, _)| *key)
            .collect();
        stale.sort_unstable();
        for (sector, fidelity) in stale {
            if self.release(sector, fidelity) {
                summary.released += 1;
            }
        }

        if self.memory.is_over_budget() {
            let priorities: FxHashMap<GeometryKey, f32> = self
                .pairs
                .iter()
                .map(|(key, entry)| (*key, entry.priority))
                .collect();
            for (sector, fidelity) in select_evictions(&self.memory, &priorities, &wanted) {
                if self.release(sector, fidelity) {
                    summary.evicted += 1;
                    self.stats.evicted += 1;
                }
            }
        }

        if summary != UpdateSummary::default() {
            tracing::debug!(model = %self.model, tick, ?summary, "scheduler update");
        }
        summary
    }

    fn submit(&mut self, key: GeometryKey) -> bool {
        let cancelled = Arc::new(AtomicBool::new(false));
        let job = FetchJob {
            sector: key.0,
            fidelity: key.1,
            cancelled: Arc::clone(&cancelled),
        };
        if !self.pool.submit(job) {
            tracing::warn!(model = %self.model, sector = %key.0, "fetch pool is shut down");
            return false;
        }
        let entry = self.pairs.entry(key).or_default();
        entry.cancelled = Some(cancelled);
        entry.released = false;
        true
    }

    fn complete(&mut self, completion: FetchCompletion) {
        let key = (completion.sector, completion.fidelity);
        let Some(entry) = self.pairs.get_mut(&key) else {
            return;
        };
        if entry.state != SectorGeometryState::Fetching {
            tracing::debug!(sector = %key.0, state = ?entry.state, "ignoring stale completion");
            return;
        }
        let released = entry.released;

        match completion.outcome {
            FetchOutcome::Parsed(_) | FetchOutcome::Skipped if released => {
                entry.reset(key);
                self.stats.dropped += 1;
                tracing::debug!(model = %self.model, sector = %key.0, fidelity = %key.1, "dropped payload of released sector");
            }
            FetchOutcome::Parsed(geometry) => {
                entry.cancelled = None;
                entry.set_state(key, SectorGeometryState::Parsed);
                let bytes = geometry.byte_size();
                self.sink.consume(key.0, key.1, geometry);
                entry.set_state(key, SectorGeometryState::Consumed);
                self.memory.on_consumed(key, bytes);
                self.stats.consumed += 1;
            }
            FetchOutcome::Skipped => {
                // Skipped before fetching, then re-requested.
                if !self.submit(key) {
                    if let Some(entry) = self.pairs.get_mut(&key) {
                        entry.reset(key);
                    }
                }
            }
            FetchOutcome::Failed(err) => {
                entry.reset(key);
                self.stats.failed += 1;
                self.reporter.report_fetch(self.model, &err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use glam::Vec3;
    use strata_math::Aabb;
    use strata_sector::{ModelMetadata, SectorRecord};

    use super::*;
    use crate::payload::{MeshVertex, QuadPrimitive, SectorGeometry, encode_detailed, encode_simple};
    use crate::source::MemoryDataSource;

    type Log = Arc<Mutex<Vec<(&'static str, SectorId, Fidelity)>>>;

    struct RecordingSink(Log);

    impl SectorGeometrySink for RecordingSink {
        fn consume(&mut self, sector: SectorId, fidelity: Fidelity, _geometry: SectorGeometry) {
            self.0.lock().unwrap().push(("consume", sector, fidelity));
        }

        fn discard(&mut self, sector: SectorId, fidelity: Fidelity) {
            self.0.lock().unwrap().push(("discard", sector, fidelity));
        }
    }

    fn tree() -> Arc<SectorTree> {
        let unit = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let records = (1..=4)
            .map(|id| SectorRecord::new(id, (id > 1).then_some(1), unit).with_faces(0.5, 100))
            .collect();
        Arc::new(SectorTree::load(&ModelMetadata::new(records)).unwrap())
    }

    fn source() -> MemoryDataSource {
        let mut source = MemoryDataSource::new();
        for id in 1..=4 {
            source.insert(SectorId(id), Fidelity::Simple, encode_simple(&[QuadPrimitive::default()]));
            let vertices = [MeshVertex::default(); 3];
            source.insert(SectorId(id), Fidelity::Detailed, encode_detailed(&vertices, &[0, 1, 2]));
        }
        source
    }

    fn scheduler(settings: SchedulerSettings) -> (SectorLoadScheduler, Log) {
        let log = Log::default();
        let scheduler = SectorLoadScheduler::new(
            ModelId(0),
            tree(),
            Arc::new(source()),
            Box::new(RecordingSink(log.clone())),
            SchedulerSettings {
                worker_threads: 2,
                ..settings
            },
        )
        .unwrap();
        (scheduler, log)
    }

    fn candidate(sector: u32, fidelity: Fidelity, priority: f32) -> LoadCandidate {
        LoadCandidate {
            sector: SectorId(sector),
            fidelity,
            priority,
        }
    }

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn test_request_consumes_then_release_discards() {
        let (mut scheduler, log) = scheduler(SchedulerSettings::default());
        assert_eq!(scheduler.request(SectorId(2), Fidelity::Detailed), RequestOutcome::Issued);
        assert_eq!(scheduler.state(SectorId(2), Fidelity::Detailed), SectorGeometryState::Fetching);
        assert!(scheduler.wait_until_idle(WAIT));

        assert_eq!(scheduler.state(SectorId(2), Fidelity::Detailed), SectorGeometryState::Consumed);
        assert_eq!(scheduler.resident_detailed_ids(), vec![SectorId(2)]);
        assert_eq!(scheduler.resident_bytes(), 3 * 32 + 3 * 4);
        assert_eq!(
            scheduler.request(SectorId(2), Fidelity::Detailed),
            RequestOutcome::AlreadyAvailable
        );

        assert!(scheduler.release(SectorId(2), Fidelity::Detailed));
        assert!(!scheduler.release(SectorId(2), Fidelity::Detailed));
        assert_eq!(scheduler.state(SectorId(2), Fidelity::Detailed), SectorGeometryState::Discarded);
        assert_eq!(scheduler.resident_bytes(), 0);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                ("consume", SectorId(2), Fidelity::Detailed),
                ("discard", SectorId(2), Fidelity::Detailed)
            ]
        );

        // Discarded pairs can be fetched again.
        assert_eq!(scheduler.request(SectorId(2), Fidelity::Detailed), RequestOutcome::Issued);
        assert!(scheduler.wait_until_idle(WAIT));
        assert_eq!(scheduler.stats().consumed, 2);
    }

    #[test]
    fn test_unknown_sector_is_ignored() {
        let (mut scheduler, _) = scheduler(SchedulerSettings::default());
        assert_eq!(scheduler.request(SectorId(99), Fidelity::Simple), RequestOutcome::UnknownSector);
        assert_eq!(scheduler.fetching_count(), 0);
    }

    #[test]
    fn test_update_caps_concurrent_fetches() {
        let (mut scheduler, _) = scheduler(SchedulerSettings {
            max_concurrent_fetches: 2,
            ..Default::default()
        });
        let ranking: Vec<_> = (1..=4).map(|id| candidate(id, Fidelity::Simple, 0.5)).collect();
        let summary = scheduler.update(&ranking);
        assert_eq!(summary.requested, 2);
        assert_eq!(summary.deferred, 2);
        assert_eq!(scheduler.state(SectorId(3), Fidelity::Simple), SectorGeometryState::NotRequested);

        assert!(scheduler.wait_until_idle(WAIT));
        let summary = scheduler.update(&ranking);
        assert_eq!(summary.requested, 2);
        assert!(scheduler.wait_until_idle(WAIT));
        assert_eq!(scheduler.resident_count(), 4);
    }

    #[test]
    fn test_update_respects_request_budget() {
        let (mut scheduler, _) = scheduler(SchedulerSettings {
            request_budget: 1,
            ..Default::default()
        });
        let ranking = [candidate(1, Fidelity::Simple, 0.9), candidate(2, Fidelity::Simple, 0.1)];
        assert_eq!(scheduler.update(&ranking).requested, 1);
        assert_eq!(scheduler.state(SectorId(2), Fidelity::Simple), SectorGeometryState::NotRequested);
    }

    #[test]
    fn test_release_waits_for_grace_period() {
        let (mut scheduler, log) = scheduler(SchedulerSettings {
            release_grace_ticks: 2,
            ..Default::default()
        });
        scheduler.update(&[candidate(1, Fidelity::Simple, 1.0)]);
        assert!(scheduler.wait_until_idle(WAIT));

        // Unranked for two updates: still resident.
        assert_eq!(scheduler.update(&[]).released, 0);
        assert_eq!(scheduler.update(&[]).released, 0);
        assert_eq!(scheduler.resident_count(), 1);

        assert_eq!(scheduler.update(&[]).released, 1);
        assert_eq!(scheduler.state(SectorId(1), Fidelity::Simple), SectorGeometryState::Discarded);
        assert_eq!(log.lock().unwrap().last(), Some(&("discard", SectorId(1), Fidelity::Simple)));
    }

    #[test]
    fn test_ranked_pair_is_never_released() {
        let (mut scheduler, _) = scheduler(SchedulerSettings {
            release_grace_ticks: 0,
            ..Default::default()
        });
        let ranking = [candidate(1, Fidelity::Detailed, 1.0)];
        scheduler.update(&ranking);
        assert!(scheduler.wait_until_idle(WAIT));
        for _ in 0..3 {
            assert_eq!(scheduler.update(&ranking).released, 0);
        }
        assert_eq!(scheduler.resident_detailed_ids(), vec![SectorId(1)]);
    }

    #[test]
    fn test_memory_budget_evicts_lowest_priority_unranked() {
        // Each detailed payload is 108 bytes.
        let (mut scheduler, _) = scheduler(SchedulerSettings {
            memory_budget_bytes: 250,
            release_grace_ticks: 100,
            ..Default::default()
        });
        scheduler.update(&[
            candidate(1, Fidelity::Detailed, 0.9),
            candidate(2, Fidelity::Detailed, 0.2),
        ]);
        assert!(scheduler.wait_until_idle(WAIT));
        scheduler.update(&[candidate(3, Fidelity::Detailed, 0.5)]);
        assert!(scheduler.wait_until_idle(WAIT));
        assert_eq!(scheduler.resident_bytes(), 324);

        let summary = scheduler.update(&[candidate(3, Fidelity::Detailed, 0.5)]);
        assert_eq!(summary.evicted, 1);
        assert_eq!(scheduler.resident_detailed_ids(), vec![SectorId(1), SectorId(3)]);
        assert_eq!(scheduler.stats().evicted, 1);
    }

    #[test]
    fn test_failed_fetch_returns_to_not_requested() {
        struct Collect(Mutex<Vec<SectorId>>);
        impl ErrorReporter for Collect {
            fn report_fetch(&self, _model: ModelId, error: &crate::SectorFetchError) {
                self.0.lock().unwrap().push(error.sector);
            }
            fn report_metadata(&self, _: ModelId, _: &strata_sector::MetadataCorruptError) {}
        }

        let log = Log::default();
        let mut scheduler = SectorLoadScheduler::new(
            ModelId(0),
            tree(),
            Arc::new(MemoryDataSource::new()),
            Box::new(RecordingSink(log.clone())),
            SchedulerSettings::default(),
        )
        .unwrap();
        let reporter = Arc::new(Collect(Mutex::new(Vec::new())));
        scheduler.set_reporter(reporter.clone());

        scheduler.request(SectorId(3), Fidelity::Simple);
        assert!(scheduler.wait_until_idle(WAIT));
        assert_eq!(scheduler.state(SectorId(3), Fidelity::Simple), SectorGeometryState::NotRequested);
        assert_eq!(*reporter.0.lock().unwrap(), vec![SectorId(3)]);
        assert_eq!(scheduler.stats().failed, 1);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_release_all_discards_everything() {
        let (mut scheduler, log) = scheduler(SchedulerSettings::default());
        scheduler.request(SectorId(1), Fidelity::Simple);
        scheduler.request(SectorId(2), Fidelity::Detailed);
        assert!(scheduler.wait_until_idle(WAIT));
        assert_eq!(scheduler.release_all(), 2);
        assert_eq!(scheduler.resident_count(), 0);
        let discards = log.lock().unwrap().iter().filter(|e| e.0 == "discard").count();
        assert_eq!(discards, 2);
    }

    #[test]
    fn test_stats_since_snapshot() {
        let earlier = SchedulerStats {
            issued: 2,
            consumed: 1,
            ..Default::default()
        };
        let now = SchedulerStats {
            issued: 5,
            consumed: 4,
            failed: 1,
            ..Default::default()
        };
        let delta = now.since(&earlier);
        assert_eq!((delta.issued, delta.consumed, delta.failed), (3, 3, 1));
    }
}
