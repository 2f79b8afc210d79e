//! A large image split into fixed-size tiles for incremental upload.
//!
//! The tile state sits behind a mutex shared between the owning page slot
//! and any pending entries in the upload queue, so `recycle` is safe to call
//! while the uploader is processing the same texture from another clone.

use std::sync::{Arc, Mutex};

use image::RgbaImage;

use crate::constants::TILE_SIZE;
use crate::payload::DecodedPayload;

struct Tile {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    /// Pixel rows, present once the tile has been uploaded.
    pixels: Option<Vec<u8>>,
}

struct TextureState {
    source: Option<DecodedPayload>,
    tiles: Vec<Tile>,
    recycled: bool,
}

/// A tiled texture over one decoded payload.
///
/// Cheap to clone; all clones share the same tile state. Exactly one
/// `recycle` call across all clones returns the payload.
#[derive(Clone)]
pub struct TiledTexture {
    width: u32,
    height: u32,
    state: Arc<Mutex<TextureState>>,
}

fn make_tiles(width: u32, height: u32) -> Vec<Tile> {
    let mut tiles = Vec::new();
    let mut y = 0;
    while y < height {
        let th = TILE_SIZE.min(height - y);
        let mut x = 0;
        while x < width {
            let tw = TILE_SIZE.min(width - x);
            tiles.push(Tile {
                x,
                y,
                width: tw,
                height: th,
                pixels: None,
            });
            x += TILE_SIZE;
        }
        y += TILE_SIZE;
    }
    tiles
}

impl TiledTexture {
    /// Wrap a decoded payload in a tile grid. No pixel data moves until the
    /// uploader processes the texture.
    pub fn new(source: DecodedPayload) -> Self {
        let (width, height) = source.dimensions();
        Self {
            width,
            height,
            state: Arc::new(Mutex::new(TextureState {
                source: Some(source),
                tiles: make_tiles(width, height),
                recycled: false,
            })),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_recycled(&self) -> bool {
        self.state.lock().unwrap().recycled
    }

    /// Number of tiles with pixel data resident.
    pub fn uploaded_tiles(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.tiles.iter().filter(|t| t.pixels.is_some()).count()
    }

    pub fn tile_count(&self) -> usize {
        self.state.lock().unwrap().tiles.len()
    }

    /// Copy pixel data from the source into every tile that does not have
    /// it yet. Returns the number of tiles uploaded; 0 if the texture was
    /// recycled or has no pending tiles.
    pub(super) fn upload_pending(&self) -> usize {
        let mut guard = self.state.lock().unwrap();
        let TextureState {
            source,
            tiles,
            recycled,
        } = &mut *guard;
        if *recycled {
            return 0;
        }
        let src = match source {
            Some(DecodedPayload::Static(img)) => img,
            Some(DecodedPayload::Animated { thumbnail, .. }) => thumbnail,
            None => return 0,
        };
        let mut uploaded = 0;
        for tile in tiles.iter_mut() {
            if tile.pixels.is_none() {
                tile.pixels = Some(copy_region(src, tile.x, tile.y, tile.width, tile.height));
                uploaded += 1;
            }
        }
        uploaded
    }

    /// Swap the source pixels (animated frame flip) and mark every tile
    /// pending again. Returns the displaced buffer so the caller can keep
    /// it for reuse. No-op on a recycled texture.
    pub(super) fn set_source(&self, pixels: RgbaImage) -> Option<RgbaImage> {
        let mut state = self.state.lock().unwrap();
        if state.recycled {
            return None;
        }
        let replaced = match state.source.replace(DecodedPayload::Static(pixels)) {
            Some(DecodedPayload::Static(img)) => Some(img),
            Some(DecodedPayload::Animated { thumbnail, .. }) => Some(thumbnail),
            None => None,
        };
        for tile in state.tiles.iter_mut() {
            tile.pixels = None;
        }
        replaced
    }

    /// Release the texture. The first call frees all tile memory and
    /// returns the payload; later calls return `None`.
    pub fn recycle(&self) -> Option<DecodedPayload> {
        let mut state = self.state.lock().unwrap();
        if state.recycled {
            return None;
        }
        state.recycled = true;
        state.tiles.clear();
        state.source.take()
    }
}

fn copy_region(src: &RgbaImage, x: u32, y: u32, width: u32, height: u32) -> Vec<u8> {
    image::imageops::crop_imm(src, x, y, width, height)
        .to_image()
        .into_raw()
}
