// Error taxonomy for the persistence boundary.
//
// Detection, validation, and conflict analysis never fail — they return
// tagged results. Only store I/O can produce a hard error, and it surfaces
// through this type. A failed transaction leaves persisted state untouched;
// the caller must treat the world edit that triggered it as uncommitted.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("storage I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding failure: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("unsupported snapshot version {found} (expected {expected})")]
    SnapshotVersion { expected: u32, found: u32 },
}
