// Build-time configuration
//
// Capacities are const generics on the types that own storage; the
// values here are the limits and defaults they are checked against.

/// Periodic tick interrupt rate (TICK_TIMER runs at 1024 Hz on Rabbit boards).
pub const DEFAULT_TICKS_PER_SEC: u32 = 1024;

/// Largest tick budget a slice may be registered with (about 8 s at 1024 Hz).
pub const MAX_SLICE_TICKS: i32 = 8192;

/// Smallest execution-context budget a `Sliced` block may declare, in bytes.
/// Must cover the worst case of the block plus the tick interrupt frame.
pub const MIN_SLICE_STACK: usize = 64;

/// Callers a single-user cofunction remembers while it is bound elsewhere.
pub const MAX_PENDING_CALLERS: usize = 4;

/// Instances allowed in one indexed family (index is stored in a u8).
pub const MAX_FAMILY_SIZE: usize = u8::MAX as usize;
