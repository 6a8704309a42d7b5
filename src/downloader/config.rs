//! Download configuration constants

/// Concurrent transfers when not configured.
/// Four keeps a mirror reasonably fast without hammering the CDN.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Upper bound on concurrent transfers
pub const MAX_CONCURRENCY: usize = 32;

/// Suffix of the hidden in-flight file next to each destination
pub const PART_SUFFIX: &str = ".part";

/// Clamp a requested concurrency into the supported range
pub fn clamp_concurrency(requested: usize) -> usize {
    requested.clamp(1, MAX_CONCURRENCY)
}
