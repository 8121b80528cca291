use thiserror::Error;

/// The error returned by every codec read and write. Reads fail on
/// underflow or malformed data without advancing the reader; writes fail
/// when the writer's capacity would be exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("codec error: out of bounds or malformed data")]
pub struct CodecErr;
