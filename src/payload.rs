//! Decoded image payloads and synchronous request results.
//!
//! A payload is produced by a provider exactly once per page and is owned by
//! exactly one party at a time: the provider (before delivery), a texture
//! (after attach), or the provider's bitmap pool again (after release).

use std::time::Duration;

use image::RgbaImage;

/// One decoded frame of an animated image.
#[derive(Debug, Clone)]
pub struct AnimatedFrame {
    pub pixels: RgbaImage,
    pub delay: Duration,
}

/// Decoded pixel data for one page.
#[derive(Debug)]
pub enum DecodedPayload {
    /// A single still image.
    Static(RgbaImage),
    /// An animated image: all decoded frames plus the first frame as the
    /// thumbnail shown until playback starts.
    Animated {
        frames: Vec<AnimatedFrame>,
        thumbnail: RgbaImage,
    },
}

impl DecodedPayload {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            DecodedPayload::Static(img) => img.dimensions(),
            DecodedPayload::Animated { thumbnail, .. } => thumbnail.dimensions(),
        }
    }
}

/// Immediate result of `GalleryProvider::request`.
#[derive(Debug)]
pub enum PageResult {
    /// Fetch/decode in progress, fraction in `[0, 1]`.
    Progress(f32),
    /// Work already queued; a callback will arrive, nothing to show yet.
    Wait,
    /// Nothing known about this page yet; work has been kicked off.
    None,
    /// The page failed and will not produce a payload.
    Failed,
    /// Payload already materialized.
    Ready(DecodedPayload),
    /// The provider's internal state for this page is inconsistent.
    /// Signals a provider contract mismatch; shown as a distinct state so
    /// it is visible in tests rather than masked as a failure.
    Unknown,
}
