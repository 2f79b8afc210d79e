//! Page-indexed gallery data sources.
//!
//! Providers deliver page data asynchronously through an event channel and
//! answer synchronous `request` calls with the immediate state of a page.
//! Both concrete sources (zip archive, remote spider) expose the same
//! capability set; the controller never branches on the concrete type.

mod archive;
mod spider;

pub use archive::ArchiveProvider;
pub use spider::{FetchMode, GalleryRecord, PageFetcher, SpiderProvider, SpiderRegistry};

use std::io::Cursor;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, ImageFormat, RgbaImage};

use crate::error::{GalleryError, Result};
use crate::payload::{AnimatedFrame, DecodedPayload, PageResult};

/// Asynchronous notification from a provider.
#[derive(Debug)]
pub enum ProviderEvent {
    /// Page count became known or changed.
    Size(isize),
    /// A page materialized; `None` means the decode failed upstream.
    Image {
        index: usize,
        payload: Option<DecodedPayload>,
    },
    /// Fetch/decode progress for a page, fraction in `[0, 1]`.
    Percent { index: usize, percent: f32 },
    /// A page finished in the background; the receiver should re-request
    /// its materialized state.
    PageSucceed(usize),
    /// A page failed for good.
    PageFailed { index: usize, error: String },
    /// The whole gallery failed.
    TotallyFailed(String),
    /// Some pages failed but the gallery keeps going.
    PartlyFailed(String),
}

/// Sending half of the provider event channel. Cloned into provider worker
/// threads; sends after the listener detached are dropped silently.
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<ProviderEvent>,
}

impl EventSender {
    pub fn send(&self, event: ProviderEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("listener gone, dropping provider event");
        }
    }
}

pub fn event_channel() -> (EventSender, Receiver<ProviderEvent>) {
    let (tx, rx) = channel();
    (EventSender { tx }, rx)
}

/// The capability set the controller consumes.
pub trait GalleryProvider: Send {
    /// Page count; `<= 0` means not yet known.
    fn size(&self) -> isize;

    /// Immediate state of a page. Kicks off materialization as a side
    /// effect where the page has not been touched yet.
    fn request(&self, index: usize) -> PageResult;

    /// Hand a payload back for buffer reuse when it was never attached to
    /// a texture, or after its texture was recycled.
    fn release_payload(&self, payload: DecodedPayload);

    /// Attach or detach the event listener.
    fn set_listener(&self, listener: Option<EventSender>);

    /// Uniform release path; each source stops itself appropriately.
    fn release(self: Box<Self>);
}

/// Pool of returned pixel buffers, shared with decode jobs for reuse.
#[derive(Clone, Default)]
pub struct BitmapPool {
    buffers: Arc<Mutex<Vec<RgbaImage>>>,
}

impl BitmapPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, buffer: RgbaImage) {
        self.buffers.lock().unwrap().push(buffer);
    }

    /// Break a released payload into its pixel buffers.
    pub fn put_payload(&self, payload: DecodedPayload) {
        match payload {
            DecodedPayload::Static(img) => self.put(img),
            DecodedPayload::Animated { frames, thumbnail } => {
                self.put(thumbnail);
                for frame in frames {
                    self.put(frame.pixels);
                }
            }
        }
    }

    pub fn take(&self) -> Option<RgbaImage> {
        self.buffers.lock().unwrap().pop()
    }

    pub fn len(&self) -> usize {
        self.buffers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.lock().unwrap().is_empty()
    }
}

/// Decode raw image bytes into a payload. GIF data becomes an animated
/// payload with the first frame as the thumbnail; everything else decodes
/// to a static RGBA image.
pub fn decode_payload(data: &[u8]) -> Result<DecodedPayload> {
    let format = image::guess_format(data)?;
    if format == ImageFormat::Gif {
        let decoder = GifDecoder::new(Cursor::new(data))?;
        let frames: Vec<AnimatedFrame> = decoder
            .into_frames()
            .collect_frames()?
            .into_iter()
            .map(|frame| {
                let delay = Duration::from(frame.delay());
                AnimatedFrame {
                    pixels: frame.into_buffer(),
                    delay,
                }
            })
            .collect();
        let thumbnail = frames
            .first()
            .map(|f| f.pixels.clone())
            .ok_or(GalleryError::EmptyAnimation)?;
        Ok(DecodedPayload::Animated { frames, thumbnail })
    } else {
        let img = image::load_from_memory_with_format(data, format)?.into_rgba8();
        Ok(DecodedPayload::Static(img))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = RgbaImage::new(w, h);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn decode_static_png() {
        let payload = decode_payload(&png_bytes(20, 10)).unwrap();
        match payload {
            DecodedPayload::Static(img) => assert_eq!(img.dimensions(), (20, 10)),
            _ => panic!("expected static payload"),
        }
    }

    #[test]
    fn decode_garbage_fails() {
        assert!(decode_payload(&[0u8; 16]).is_err());
    }

    #[test]
    fn bitmap_pool_counts_released_buffers() {
        let pool = BitmapPool::new();
        assert!(pool.is_empty());
        pool.put_payload(DecodedPayload::Static(RgbaImage::new(4, 4)));
        pool.put_payload(DecodedPayload::Animated {
            frames: vec![
                AnimatedFrame {
                    pixels: RgbaImage::new(4, 4),
                    delay: Duration::from_millis(40),
                },
                AnimatedFrame {
                    pixels: RgbaImage::new(4, 4),
                    delay: Duration::from_millis(40),
                },
            ],
            thumbnail: RgbaImage::new(4, 4),
        });
        assert_eq!(pool.len(), 4);
        assert!(pool.take().is_some());
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn dropped_listener_does_not_panic_sender() {
        let (tx, rx) = event_channel();
        drop(rx);
        tx.send(ProviderEvent::Size(3));
    }
}
