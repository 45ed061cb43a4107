//! Error types for avilearn.

/// Result type alias for avilearn operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for avilearn.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration directory could not be determined.
    #[error("could not determine configuration directory for this platform")]
    ConfigDirNotFound,

    /// Failed to read configuration file.
    #[error("failed to read config file '{path}'")]
    ConfigRead {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("failed to parse config file '{path}'")]
    ConfigParse {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    /// Failed to write configuration file.
    #[error("failed to write config file '{path}'")]
    ConfigWrite {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize configuration.
    #[error("failed to serialize config")]
    ConfigSerialize {
        /// Underlying serialization error.
        #[source]
        source: toml::ser::Error,
    },

    /// Failed to read the object metadata snapshot.
    #[error("failed to read metadata snapshot '{path}'")]
    MetadataRead {
        /// Path to the snapshot file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the object metadata snapshot.
    #[error("failed to parse metadata snapshot '{path}'")]
    MetadataParse {
        /// Path to the snapshot file.
        path: std::path::PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Failed to build the embedding session.
    #[error("failed to build embedder: {reason}")]
    EmbedderBuild {
        /// Description of the build failure.
        reason: String,
    },

    /// Embedding inference failed.
    #[error("embedding inference failed: {reason}")]
    Embed {
        /// Description of the inference failure.
        reason: String,
    },

    /// No embeddable objects were found.
    #[error("no bird objects found above confidence {min_confidence}")]
    NoObjects {
        /// Confidence filter that was applied.
        min_confidence: f32,
    },

    /// Clustering was requested with no input embeddings.
    #[error("clustering requested with zero embeddings")]
    EmptyEmbeddings,

    /// Clustering input was malformed.
    #[error("invalid clustering input: {message}")]
    ClusteringInput {
        /// Description of the problem.
        message: String,
    },

    /// No clustering experiment produced a usable labeling.
    #[error("no clustering configuration produced at least 2 clusters")]
    NoUsableClustering,

    /// A trainer operation was called in the wrong lifecycle state.
    #[error("trainer is in state {actual}, operation requires {required}")]
    TrainerState {
        /// State the trainer is actually in.
        actual: &'static str,
        /// Minimum state the operation requires.
        required: &'static str,
    },

    /// Training data preparation failed.
    #[error("failed to prepare training data: {message}")]
    DatasetPrepare {
        /// Description of the failure.
        message: String,
    },

    /// A correction references a class beyond the model's capacity.
    #[error("class id {class_id} is out of range for a model with {n_classes} classes")]
    ClassOutOfRange {
        /// Offending class id.
        class_id: usize,
        /// Current model class count.
        n_classes: usize,
    },

    /// Retraining was requested with no recorded corrections.
    #[error("no corrections available for retraining")]
    NoCorrections,

    /// All supplied corrections were filtered out.
    #[error("no valid corrections remain for a model with {n_classes} classes")]
    NoValidCorrections {
        /// Current model class count.
        n_classes: usize,
    },

    /// No trained model checkpoint exists yet.
    #[error("no trained model found at '{path}' (run 'avilearn train' first)")]
    ModelNotFound {
        /// Expected checkpoint path.
        path: std::path::PathBuf,
    },

    /// Failed to read a model checkpoint.
    #[error("failed to read checkpoint '{path}'")]
    CheckpointRead {
        /// Path to the checkpoint file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a model checkpoint.
    #[error("failed to parse checkpoint '{path}'")]
    CheckpointParse {
        /// Path to the checkpoint file.
        path: std::path::PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// A checkpoint's recorded shapes do not form a valid model.
    #[error("checkpoint '{path}' is inconsistent: {message}")]
    CheckpointInvalid {
        /// Path to the checkpoint file.
        path: std::path::PathBuf,
        /// Description of the inconsistency.
        message: String,
    },

    /// Failed to write a durable artifact (checkpoint or review log).
    #[error("failed to write '{path}'")]
    ArtifactWrite {
        /// Path to the artifact file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize a durable artifact.
    #[error("failed to serialize '{path}'")]
    ArtifactSerialize {
        /// Path to the artifact file.
        path: std::path::PathBuf,
        /// Underlying serialization error.
        #[source]
        source: serde_json::Error,
    },

    /// Failed to read the review log.
    #[error("failed to read review log '{path}'")]
    ReviewLogRead {
        /// Path to the review log file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the review log.
    #[error("failed to parse review log '{path}'")]
    ReviewLogParse {
        /// Path to the review log file.
        path: std::path::PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Internal error (for unexpected failures).
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}
