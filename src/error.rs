use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("Invalid grid size: {0}")]
    InvalidGridSize(String),

    #[error("Mask shape {found_rows}x{found_cols} does not match grid shape {expected_rows}x{expected_cols}")]
    MaskDimensionMismatch {
        expected_rows: usize,
        expected_cols: usize,
        found_rows: usize,
        found_cols: usize,
    },

    #[error("Invalid mask: {0}")]
    InvalidMask(String),

    #[error("Invalid model parameter: {0}")]
    InvalidParameter(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Failed to read configuration {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize checkpoint: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Checkpoint of {needed} bytes would exceed the space limit of {limit} bytes ({used} already used)")]
    SpaceLimitExceeded { needed: u64, used: u64, limit: u64 },

    #[error("Checkpoint queue is full, dropping chunk {chunk_index}")]
    QueueFull { chunk_index: usize },

    #[error("Checkpoint dispatcher is closed")]
    DispatcherClosed,

    #[error("Checkpoint worker panicked")]
    WorkerPanicked,
}

#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Grid error: {0}")]
    Grid(#[from] GridError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
}
