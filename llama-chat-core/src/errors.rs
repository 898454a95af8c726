use std::path::PathBuf;

// Configuration errors

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set, run the bootstrap before resolving the distributed config")]
    Missing(&'static str),

    #[error("{key} is not a valid integer: {value:?}")]
    InvalidInteger { key: &'static str, value: String },

    #[error("WORLD_SIZE must be at least 1")]
    ZeroWorldSize,

    #[error("RANK {rank} is out of range for WORLD_SIZE {world_size}")]
    RankOutOfRange { rank: usize, world_size: usize },

    #[error("MASTER_ADDR must not be empty")]
    EmptyAddress,

    #[error("MASTER_PORT is not a valid port: {0:?}")]
    InvalidPort(String),

    #[error("Unknown quantization mode {0:?}, expected one of: none, fp8_mixed, int4_mixed")]
    UnknownQuantizationMode(String),
}

// Dialog errors

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DialogError {
    #[error("A dialog needs at least one message")]
    Empty,

    #[error("System message at position {0} must precede every other message")]
    SystemMessageNotFirst(usize),
}

// Generation errors

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("temperature must be a finite value >= 0, got {0}")]
    InvalidTemperature(f32),

    #[error("top_p must be in (0, 1], got {0}")]
    InvalidTopP(f32),

    #[error("max_gen_len must be greater than 0")]
    InvalidMaxGenLen,

    #[error("Cannot run a chat completion on an empty batch")]
    EmptyBatch,

    #[error("Batch of {len} dialogs exceeds max_batch_size {max}")]
    BatchTooLarge { len: usize, max: usize },
}

// Rendezvous errors

#[derive(Debug, thiserror::Error)]
pub enum RendezvousError {
    #[error("Could not resolve rendezvous address {addr}: {source}")]
    Resolve {
        addr: String,
        source: std::io::Error,
    },

    #[error("Rendezvous address {0} did not resolve to any socket address")]
    NoAddress(String),

    #[error("Rendezvous I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("Rendezvous at {addr} did not complete within {secs}s")]
    Timeout { addr: String, secs: u64 },

    #[error("Malformed rendezvous frame: {0}")]
    Frame(#[from] serde_json::Error),

    #[error("Peer closed the rendezvous connection before it completed")]
    Closed,

    #[error("Rank {0} joined the rendezvous twice")]
    DuplicateRank(usize),

    #[error("Rank {rank} is not a valid peer rank for WORLD_SIZE {world_size}")]
    InvalidPeerRank { rank: usize, world_size: usize },

    #[error("Peer rank {rank} reported WORLD_SIZE {reported}, expected {expected}")]
    WorldSizeMismatch {
        rank: usize,
        reported: usize,
        expected: usize,
    },

    #[error("Rendezvous rejected this process: {0}")]
    Rejected(String),

    #[error("Unexpected rendezvous frame: {0}")]
    Unexpected(String),
}

// Generator construction errors

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("max_seq_len must be between 1 and {max}, got {got}")]
    InvalidMaxSeqLen { got: usize, max: usize },

    #[error("max_batch_size must be greater than 0")]
    InvalidMaxBatchSize,

    #[error("Checkpoint directory not found: {0}")]
    CheckpointNotFound(PathBuf),

    #[error("No checkpoint files (*.pth) found in {0}")]
    NoCheckpointShards(PathBuf),

    #[error("Could not read checkpoint params at {path}: {source}")]
    ReadParams {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid checkpoint params at {path}: {source}")]
    InvalidParams {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Loading a checkpoint with MP={shards} but world size is {world_size}")]
    ShardMismatch { shards: usize, world_size: usize },

    #[error("Requested world size {requested} does not match the distributed world size {distributed}")]
    WorldSizeMismatch { requested: usize, distributed: usize },

    #[error("Checkpoint I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Distributed initialization failed: {0}")]
    Rendezvous(#[from] RendezvousError),

    #[error("Could not create inference client: {0}")]
    Client(String),
}
