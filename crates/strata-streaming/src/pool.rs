//! Worker threads that fetch and parse payloads off the update loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use strata_sector::{Fidelity, SectorId};

use crate::error::{FetchErrorKind, SectorFetchError};
use crate::payload::{SectorGeometry, SectorPayloadParser};
use crate::source::SectorDataSource;

pub(crate) struct FetchJob {
    pub sector: SectorId,
    pub fidelity: Fidelity,
    pub cancelled: Arc<AtomicBool>,
}

pub(crate) enum FetchOutcome {
    Parsed(SectorGeometry),
    /// Cancelled before the payload was fetched.
    Skipped,
    Failed(SectorFetchError),
}

pub(crate) struct FetchCompletion {
    pub sector: SectorId,
    pub fidelity: Fidelity,
    pub outcome: FetchOutcome,
}

fn run_job(
    job: &FetchJob,
    source: &dyn SectorDataSource,
    parser: &dyn SectorPayloadParser,
) -> FetchOutcome {
    if job.cancelled.load(Ordering::Relaxed) {
        return FetchOutcome::Skipped;
    }
    let bytes = match source.fetch_sector_payload(job.sector, job.fidelity) {
        Ok(bytes) => bytes,
        Err(cause) => {
            return FetchOutcome::Failed(SectorFetchError::new(
                FetchErrorKind::Source,
                job.sector,
                job.fidelity,
                cause,
            ));
        }
    };
    // Once downloaded, the bytes are always parsed; the scheduler drops the
    // result if the pair is still released when it arrives.
    match parser.parse(job.fidelity, &bytes) {
        Ok(geometry) => FetchOutcome::Parsed(geometry),
        Err(err) => FetchOutcome::Failed(SectorFetchError::new(
            FetchErrorKind::Parse,
            job.sector,
            job.fidelity,
            err,
        )),
    }
}

/// Fixed set of threads sharing one job queue.
pub(crate) struct FetchPool {
    job_sender: Option<Sender<FetchJob>>,
    result_receiver: Receiver<FetchCompletion>,
    workers: Vec<JoinHandle<()>>,
    in_flight: Arc<AtomicUsize>,
}

impl FetchPool {
    pub fn new(
        worker_count: usize,
        source: Arc<dyn SectorDataSource>,
        parser: Arc<dyn SectorPayloadParser>,
    ) -> std::io::Result<Self> {
        let (job_sender, job_receiver) = unbounded::<FetchJob>();
        let (result_sender, result_receiver) = unbounded();
        let in_flight = Arc::new(AtomicUsize::new(0));

        let mut workers = Vec::with_capacity(worker_count.max(1));
        for _ in 0..worker_count.max(1) {
            let jobs = job_receiver.clone();
            let results = result_sender.clone();
            let source = Arc::clone(&source);
            let parser = Arc::clone(&parser);
            let in_flight = Arc::clone(&in_flight);

            let handle = std::thread::Builder::new()
                .name("sector-fetch-worker".into())
                .spawn(move || {
                    while let Ok(job) = jobs.recv() {
                        let outcome = run_job(&job, source.as_ref(), parser.as_ref());
                        in_flight.fetch_sub(1, Ordering::Relaxed);
                        let _ = results.send(FetchCompletion {
                            sector: job.sector,
                            fidelity: job.fidelity,
                            outcome,
                        });
                    }
                })?;
            workers.push(handle);
        }

        Ok(Self {
            job_sender: Some(job_sender),
            result_receiver,
            workers,
            in_flight,
        })
    }

    /// Queue a job. Returns `false` once the pool is shut down.
    pub fn submit(&self, job: FetchJob) -> bool {
        let Some(sender) = &self.job_sender else {
            return false;
        };
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        if sender.send(job).is_err() {
            self.in_flight.fetch_sub(1, Ordering::Relaxed);
            return false;
        }
        true
    }

    pub fn try_recv(&self) -> Option<FetchCompletion> {
        self.result_receiver.try_recv().ok()
    }

    /// Block for the next completion, up to `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<FetchCompletion> {
        match self.result_receiver.recv_timeout(timeout) {
            Ok(completion) => Some(completion),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Jobs queued or executing.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn shutdown(&mut self) {
        self.job_sender.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for FetchPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
