use strata_sector::{MetadataCorruptError, ModelId};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("metadata of {model} is corrupt: {source}")]
    Metadata {
        model: ModelId,
        #[source]
        source: MetadataCorruptError,
    },

    #[error("{0} is already loaded")]
    DuplicateModel(ModelId),

    #[error("{0} is not loaded")]
    UnknownModel(ModelId),

    #[error("failed to start fetch workers: {0}")]
    Workers(#[from] std::io::Error),
}
