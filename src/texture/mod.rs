//! Tiled GPU-side textures and the upload queue feeding them.

mod animated;
mod tiled;
mod uploader;

pub use animated::AnimatedTexture;
pub use tiled::TiledTexture;
pub use uploader::Uploader;

use crate::payload::DecodedPayload;

/// The texture owned by one page slot.
pub enum PageTexture {
    Static(TiledTexture),
    Animated(AnimatedTexture),
}

impl PageTexture {
    /// Release the texture, returning the consumed payload on the first
    /// call and `None` on any later call.
    pub fn recycle(&self) -> Option<DecodedPayload> {
        match self {
            PageTexture::Static(t) => t.recycle(),
            PageTexture::Animated(t) => t.recycle(),
        }
    }

    pub fn is_recycled(&self) -> bool {
        match self {
            PageTexture::Static(t) => t.is_recycled(),
            PageTexture::Animated(t) => t.is_recycled(),
        }
    }
}
