/// Stable identifier the server assigns to each accepted connection.
/// Allocation is monotonic starting at 1.
pub type ConnectionUid = u64;

/// 16-bit identifier selecting a handler bucket.
pub type MessageKey = u16;

/// The client's own connection identifier. Never issued to remote
/// connections.
pub const SELF_UID: ConnectionUid = 0;
