//! Animated (multi-frame) tiled texture.
//!
//! Holds the decoded frame list alongside a tiled texture showing the
//! current frame. Frame flips are decoded-and-retiled on the shared decode
//! pool so the owning thread never blocks on pixel copies.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::RgbaImage;

use crate::decode::DecodePool;
use crate::error::Result;
use crate::payload::{AnimatedFrame, DecodedPayload};

use super::{TiledTexture, Uploader};

pub struct AnimatedTexture {
    tiled: TiledTexture,
    frames: Arc<Mutex<Option<Vec<AnimatedFrame>>>>,
    current: Arc<AtomicUsize>,
    /// Decode-time thumbnail buffer displaced by the first frame flip, kept
    /// so recycle can hand it back to the provider's pool.
    spare: Arc<Mutex<Option<RgbaImage>>>,
}

impl AnimatedTexture {
    /// Build from a decoded animated payload. The thumbnail is shown until
    /// the first `advance`.
    pub fn new(frames: Vec<AnimatedFrame>, thumbnail: RgbaImage) -> Self {
        Self {
            tiled: TiledTexture::new(DecodedPayload::Static(thumbnail)),
            frames: Arc::new(Mutex::new(Some(frames))),
            current: Arc::new(AtomicUsize::new(0)),
            spare: Arc::new(Mutex::new(None)),
        }
    }

    pub fn tiled(&self) -> &TiledTexture {
        &self.tiled
    }

    pub fn is_recycled(&self) -> bool {
        self.tiled.is_recycled()
    }

    /// Delay of the frame currently shown, for the host's flip scheduling.
    pub fn frame_delay(&self) -> Option<Duration> {
        let frames = self.frames.lock().unwrap();
        let frames = frames.as_ref()?;
        frames
            .get(self.current.load(Ordering::Relaxed) % frames.len())
            .map(|f| f.delay)
    }

    /// Queue a flip to the next frame on the decode pool. The job re-tiles
    /// the texture and re-registers it with the uploader; it no-ops if the
    /// texture was recycled in the meantime.
    pub fn advance(&self, pool: &DecodePool, uploader: &Uploader) -> Result<()> {
        let tiled = self.tiled.clone();
        let frames = Arc::clone(&self.frames);
        let current = Arc::clone(&self.current);
        let spare = Arc::clone(&self.spare);
        let uploader = uploader.clone();
        pool.submit(move || {
            let frames = frames.lock().unwrap();
            let Some(frames) = frames.as_ref() else {
                return;
            };
            if frames.is_empty() || tiled.is_recycled() {
                return;
            }
            let next = (current.load(Ordering::Relaxed) + 1) % frames.len();
            current.store(next, Ordering::Relaxed);
            if let Some(buffer) = tiled.set_source(frames[next].pixels.clone()) {
                spare.lock().unwrap().get_or_insert(buffer);
            }
            uploader.add_texture(&tiled);
        })
    }

    /// Release the texture, reassembling the animated payload on the first
    /// call so it can go back to the provider's pool.
    pub fn recycle(&self) -> Option<DecodedPayload> {
        let frames = self.frames.lock().unwrap().take();
        let spare = self.spare.lock().unwrap().take();
        match (frames, self.tiled.recycle()) {
            (Some(frames), Some(DecodedPayload::Static(current))) => {
                // Prefer the original decode buffer over the current frame's
                // clone so the pool gets the allocation that came from it.
                let thumbnail = spare.unwrap_or(current);
                Some(DecodedPayload::Animated { frames, thumbnail })
            }
            _ => None,
        }
    }
}
