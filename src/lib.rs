//! yomu - paged gallery viewer core
//!
//! The page-state and texture-lifecycle machinery behind a tiled-texture
//! image gallery: a provider abstraction over remote and archive-backed
//! sources, a bounded background decode pool, a tiled-texture uploader, and
//! the controller that maps asynchronous provider events onto per-page
//! display states without leaking a single texture.

mod constants;
mod controller;
mod decode;
mod error;
mod payload;
mod provider;
mod request;
mod texture;
mod view;

pub use controller::{FailurePolicy, PageStateController};
pub use decode::DecodePool;
pub use error::{GalleryError, Result};
pub use payload::{AnimatedFrame, DecodedPayload, PageResult};
pub use provider::{
    ArchiveProvider, BitmapPool, EventSender, FetchMode, GalleryProvider, GalleryRecord,
    PageFetcher, ProviderEvent, SpiderProvider, SpiderRegistry, event_channel,
};
pub use request::{GalleryRequest, ResolveContext, resolve};
pub use texture::{AnimatedTexture, PageTexture, TiledTexture, Uploader};
pub use view::{
    GalleryAdapter, GalleryPageView, GalleryView, ImageSurface, IndexLabel, LayoutMode,
    PageState, ProgressIndicator,
};
