//! Tuning constants for the gallery core.

use std::time::Duration;

/// Side length of one texture tile in pixels.
pub const TILE_SIZE: u32 = 256;

/// Maximum number of decode worker threads.
pub const DECODE_WORKERS: usize = 3;

/// Capacity of the decode job queue. Submissions beyond this block the
/// caller rather than growing without bound.
pub const DECODE_QUEUE_CAP: usize = 64;

/// Idle time after which a decode worker exits.
pub const DECODE_KEEP_ALIVE: Duration = Duration::from_secs(3);

/// Supported image file extensions for archive entries.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];
