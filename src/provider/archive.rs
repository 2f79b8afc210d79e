//! Zip-archive-backed gallery provider.
//!
//! Entries are filtered to supported images, sorted by name, and decoded on
//! the shared decode pool when first requested. Progress, payloads and
//! failures come back through the provider event channel.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use zip::ZipArchive;

use crate::constants::IMAGE_EXTENSIONS;
use crate::decode::DecodePool;
use crate::error::{GalleryError, Result};
use crate::payload::{DecodedPayload, PageResult};

use super::{BitmapPool, EventSender, GalleryProvider, ProviderEvent, decode_payload};

const READ_CHUNK: usize = 64 * 1024;

#[derive(Clone, Copy, Debug, PartialEq)]
enum PageStatus {
    NotRequested,
    Queued,
    Loading(f32),
    Ready,
    Failed,
}

struct ArchiveInner {
    archive: Mutex<ZipArchive<File>>,
    entries: Vec<String>,
    states: Mutex<Vec<PageStatus>>,
    listener: Mutex<Option<EventSender>>,
    bitmaps: BitmapPool,
    stopped: AtomicBool,
}

impl ArchiveInner {
    fn send(&self, event: ProviderEvent) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        if let Some(listener) = self.listener.lock().unwrap().as_ref() {
            listener.send(event);
        }
    }

    fn set_status(&self, index: usize, status: PageStatus) {
        let mut states = self.states.lock().unwrap();
        if let Some(slot) = states.get_mut(index) {
            *slot = status;
        }
    }
}

pub struct ArchiveProvider {
    inner: Arc<ArchiveInner>,
    decode: Arc<DecodePool>,
}

fn is_supported_entry(name: &str) -> bool {
    let lower = name.to_lowercase();
    if lower.contains("__macosx") || lower.contains("/.") || lower.starts_with('.') {
        return false;
    }
    IMAGE_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(&format!(".{ext}")))
}

impl ArchiveProvider {
    /// Open a zip archive as a gallery. Fails on I/O errors, unreadable
    /// archives, or archives without a single image entry.
    pub fn open(path: &Path, decode: Arc<DecodePool>) -> Result<Self> {
        let file = File::open(path)?;
        let archive = ZipArchive::new(file)?;

        let mut entries: Vec<String> = archive
            .file_names()
            .filter(|name| !name.ends_with('/') && is_supported_entry(name))
            .map(str::to_owned)
            .collect();
        if entries.is_empty() {
            return Err(GalleryError::EmptyArchive);
        }
        entries.sort();

        log::info!(
            "opened archive {:?} with {} image entries",
            path,
            entries.len()
        );

        let states = vec![PageStatus::NotRequested; entries.len()];
        Ok(Self {
            inner: Arc::new(ArchiveInner {
                archive: Mutex::new(archive),
                entries,
                states: Mutex::new(states),
                listener: Mutex::new(None),
                bitmaps: BitmapPool::new(),
                stopped: AtomicBool::new(false),
            }),
            decode,
        })
    }

    /// Number of buffers returned to the provider so far.
    pub fn pooled_bitmaps(&self) -> usize {
        self.inner.bitmaps.len()
    }

    fn queue_decode(&self, index: usize) {
        self.inner.set_status(index, PageStatus::Queued);
        let inner = Arc::clone(&self.inner);
        if self.decode.submit(move || decode_entry(inner, index)).is_err() {
            log::debug!("decode pool is down, dropping decode of page {index}");
        }
    }

    fn stop(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        self.inner.listener.lock().unwrap().take();
        log::info!("archive provider stopped");
    }
}

fn decode_entry(inner: Arc<ArchiveInner>, index: usize) {
    if inner.stopped.load(Ordering::Acquire) {
        return;
    }
    let name = inner.entries[index].clone();
    let data = {
        let mut archive = inner.archive.lock().unwrap();
        let mut entry = match archive.by_name(&name) {
            Ok(entry) => entry,
            Err(e) => {
                inner.set_status(index, PageStatus::Failed);
                inner.send(ProviderEvent::PageFailed {
                    index,
                    error: e.to_string(),
                });
                return;
            }
        };
        let total = entry.size().max(1) as f32;
        let mut data = Vec::with_capacity(entry.size() as usize);
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match entry.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    data.extend_from_slice(&chunk[..n]);
                    let percent = (data.len() as f32 / total).min(1.0);
                    inner.set_status(index, PageStatus::Loading(percent));
                    inner.send(ProviderEvent::Percent { index, percent });
                }
                Err(e) => {
                    inner.set_status(index, PageStatus::Failed);
                    inner.send(ProviderEvent::PageFailed {
                        index,
                        error: e.to_string(),
                    });
                    return;
                }
            }
        }
        data
    };

    if inner.stopped.load(Ordering::Acquire) {
        return;
    }

    match decode_payload(&data) {
        Ok(payload) => {
            log::debug!("decoded archive page {index} ({name})");
            inner.set_status(index, PageStatus::Ready);
            inner.send(ProviderEvent::Image {
                index,
                payload: Some(payload),
            });
        }
        Err(e) => {
            log::debug!("failed to decode archive page {index} ({name}): {e}");
            inner.set_status(index, PageStatus::Failed);
            inner.send(ProviderEvent::Image {
                index,
                payload: None,
            });
        }
    }
}

impl GalleryProvider for ArchiveProvider {
    fn size(&self) -> isize {
        self.inner.entries.len() as isize
    }

    fn request(&self, index: usize) -> PageResult {
        let status = {
            let states = self.inner.states.lock().unwrap();
            match states.get(index) {
                Some(status) => *status,
                None => return PageResult::Unknown,
            }
        };
        match status {
            PageStatus::NotRequested => {
                self.queue_decode(index);
                PageResult::None
            }
            PageStatus::Queued => PageResult::Wait,
            PageStatus::Loading(percent) => PageResult::Progress(percent),
            PageStatus::Ready => {
                // The payload was handed off with the ready event; decode
                // again for the re-bound view.
                self.queue_decode(index);
                PageResult::Wait
            }
            PageStatus::Failed => PageResult::Failed,
        }
    }

    fn release_payload(&self, payload: DecodedPayload) {
        self.inner.bitmaps.put_payload(payload);
    }

    fn set_listener(&self, listener: Option<EventSender>) {
        *self.inner.listener.lock().unwrap() = listener;
    }

    fn release(self: Box<Self>) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::event_channel;
    use image::{ImageFormat, RgbaImage};
    use std::io::{Cursor, Write};
    use std::time::Duration;
    use zip::write::SimpleFileOptions;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = RgbaImage::new(w, h);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn write_zip(entries: &[(&str, &[u8])]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gallery.zip");
        let file = File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, data) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
        (dir, path)
    }

    fn wait_for_image(
        rx: &std::sync::mpsc::Receiver<ProviderEvent>,
    ) -> (usize, Option<DecodedPayload>) {
        loop {
            match rx.recv_timeout(Duration::from_secs(10)).unwrap() {
                ProviderEvent::Image { index, payload } => return (index, payload),
                _ => continue,
            }
        }
    }

    #[test]
    fn open_filters_and_sorts_entries() {
        let png = png_bytes(8, 8);
        let (_dir, path) = write_zip(&[
            ("b.png", &png[..]),
            ("notes.txt", b"hi"),
            ("a.png", &png[..]),
            ("__MACOSX/a.png", &png[..]),
        ]);
        let provider = ArchiveProvider::open(&path, Arc::new(DecodePool::new())).unwrap();
        assert_eq!(provider.size(), 2);
        assert_eq!(provider.inner.entries, vec!["a.png", "b.png"]);
    }

    #[test]
    fn open_missing_file_fails() {
        let err = ArchiveProvider::open(
            Path::new("/no/such/archive.zip"),
            Arc::new(DecodePool::new()),
        );
        assert!(matches!(err, Err(GalleryError::ArchiveOpen(_))));
    }

    #[test]
    fn open_archive_without_images_fails() {
        let (_dir, path) = write_zip(&[("readme.txt", b"nothing here")]);
        let err = ArchiveProvider::open(&path, Arc::new(DecodePool::new()));
        assert!(matches!(err, Err(GalleryError::EmptyArchive)));
    }

    #[test]
    fn request_decodes_and_delivers_payload() {
        let png = png_bytes(16, 16);
        let (_dir, path) = write_zip(&[("a.png", &png[..])]);
        let pool = Arc::new(DecodePool::new());
        let provider = ArchiveProvider::open(&path, Arc::clone(&pool)).unwrap();
        let (tx, rx) = event_channel();
        provider.set_listener(Some(tx));

        assert!(matches!(provider.request(0), PageResult::None));
        let (index, payload) = wait_for_image(&rx);
        assert_eq!(index, 0);
        assert!(payload.is_some());
        // Materialized page re-decodes for a re-bound view.
        assert!(matches!(provider.request(0), PageResult::Wait));
        pool.shutdown();
    }

    #[test]
    fn corrupt_entry_reports_absent_payload() {
        let (_dir, path) = write_zip(&[("bad.png", &[0u8; 32][..])]);
        let pool = Arc::new(DecodePool::new());
        let provider = ArchiveProvider::open(&path, Arc::clone(&pool)).unwrap();
        let (tx, rx) = event_channel();
        provider.set_listener(Some(tx));

        provider.request(0);
        let (index, payload) = wait_for_image(&rx);
        assert_eq!(index, 0);
        assert!(payload.is_none());
        assert!(matches!(provider.request(0), PageResult::Failed));
        pool.shutdown();
    }

    #[test]
    fn out_of_range_request_is_unknown() {
        let png = png_bytes(8, 8);
        let (_dir, path) = write_zip(&[("a.png", &png[..])]);
        let provider = ArchiveProvider::open(&path, Arc::new(DecodePool::new())).unwrap();
        assert!(matches!(provider.request(7), PageResult::Unknown));
    }

    #[test]
    fn end_to_end_archive_pages_become_ready() {
        use crate::controller::{FailurePolicy, PageStateController};
        use crate::texture::{PageTexture, Uploader};
        use crate::view::{GalleryView, PageState};

        let png = png_bytes(16, 16);
        let (_dir, path) = write_zip(&[("a.png", &png[..]), ("b.png", &png[..])]);
        let pool = Arc::new(DecodePool::new());
        let provider = ArchiveProvider::open(&path, Arc::clone(&pool)).unwrap();

        let uploader = Uploader::new();
        let mut controller = PageStateController::new(
            Box::new(provider),
            uploader.clone(),
            pool,
            FailurePolicy::default(),
        );
        let mut view = GalleryView::new();
        view.set_window(0..2, &mut controller);

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        loop {
            controller.pump(&mut view);
            uploader.process();
            let ready = (0..2).all(|i| view.page(i).unwrap().state() == PageState::Ready);
            if ready {
                break;
            }
            assert!(std::time::Instant::now() < deadline, "pages never settled");
            std::thread::sleep(Duration::from_millis(5));
        }

        for i in 0..2 {
            match view.page(i).unwrap().image.texture() {
                Some(PageTexture::Static(t)) => {
                    assert_eq!(t.uploaded_tiles(), t.tile_count());
                }
                other => panic!("page {i} has no static texture: {:?}", other.is_some()),
            }
        }
        controller.shutdown(&mut view);
        for (_, page) in view.pages_mut() {
            assert!(!page.image.has_texture());
        }
    }

    #[test]
    fn released_payloads_land_in_pool() {
        let (_dir, path) = write_zip(&[("a.png", &png_bytes(8, 8)[..])]);
        let provider =
            ArchiveProvider::open(&path, Arc::new(DecodePool::new())).unwrap();
        provider.release_payload(DecodedPayload::Static(RgbaImage::new(8, 8)));
        assert_eq!(provider.pooled_bitmaps(), 1);
    }
}
