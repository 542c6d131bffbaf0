use strata_sector::{MetadataCorruptError, ModelId};

use crate::error::SectorFetchError;

/// Sink for errors the streaming layer recovers from but the host may want
/// to surface. Called on the update loop.
pub trait ErrorReporter: Send + Sync {
    fn report_fetch(&self, model: ModelId, error: &SectorFetchError);

    fn report_metadata(&self, model: ModelId, error: &MetadataCorruptError);
}

/// Default reporter: writes errors to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogErrorReporter;

impl ErrorReporter for LogErrorReporter {
    fn report_fetch(&self, model: ModelId, error: &SectorFetchError) {
        tracing::warn!(
            %model,
            sector = %error.sector,
            fidelity = %error.fidelity,
            kind = %error.kind,
            cause = %error.cause,
            "sector payload unavailable"
        );
    }

    fn report_metadata(&self, model: ModelId, error: &MetadataCorruptError) {
        tracing::error!(%model, %error, "rejected model metadata");
    }
}
