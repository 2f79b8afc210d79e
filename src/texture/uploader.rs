//! Pending-upload queue between texture creation and the render thread.
//!
//! Textures are enqueued from whichever thread creates them and drained in
//! one place per frame. Entries are clones of the shared tile state, so a
//! texture recycled while still queued is simply skipped.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::TiledTexture;

#[derive(Clone, Default)]
pub struct Uploader {
    queue: Arc<Mutex<VecDeque<TiledTexture>>>,
}

impl Uploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a texture for upload. Safe from any thread.
    pub fn add_texture(&self, texture: &TiledTexture) {
        self.queue.lock().unwrap().push_back(texture.clone());
    }

    /// Drain the queue, uploading every pending tile of every live texture.
    /// Returns the number of tiles uploaded.
    pub fn process(&self) -> usize {
        let mut uploaded = 0;
        loop {
            let next = self.queue.lock().unwrap().pop_front();
            let Some(texture) = next else { break };
            if texture.is_recycled() {
                log::debug!("skipping upload of recycled texture");
                continue;
            }
            uploaded += texture.upload_pending();
        }
        uploaded
    }

    pub fn pending_count(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Drop every queued entry. Called once at shutdown; the textures
    /// themselves are recycled by their owning slots.
    pub fn clear(&self) {
        let mut queue = self.queue.lock().unwrap();
        if !queue.is_empty() {
            log::debug!("clearing {} queued uploads", queue.len());
        }
        queue.clear();
    }
}
