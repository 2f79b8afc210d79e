//! Page views and the paging container.
//!
//! A `GalleryPageView` is one visual slot: a progress indicator, an index
//! label and an image surface, of which exactly one is active per display
//! state. The `GalleryView` keeps the window of instantiated pages and
//! drives bind/unbind through the adapter as the window moves.

use std::collections::BTreeMap;
use std::ops::Range;

use crate::texture::PageTexture;

/// Layout before and after the page count is known.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutMode {
    /// Single placeholder page; true page count not yet known.
    Placeholder,
    /// Full paged layout.
    Paged,
}

/// Display state of one bound page.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PageState {
    /// No provider response yet; indeterminate progress.
    Empty,
    /// Fetch/decode underway at the given fraction.
    Loading(f32),
    /// Texture attached.
    Ready,
    /// The page failed and will not recover on its own.
    Failed,
    /// Provider reported an inconsistent result shape.
    Unknown,
}

#[derive(Debug)]
pub struct ProgressIndicator {
    pub visible: bool,
    pub indeterminate: bool,
    pub value: f32,
}

#[derive(Debug)]
pub struct IndexLabel {
    pub visible: bool,
    pub text: String,
}

/// The texture slot of a page.
#[derive(Default)]
pub struct ImageSurface {
    texture: Option<PageTexture>,
}

impl ImageSurface {
    /// Swap the slot texture, returning the previous one so the caller can
    /// recycle it.
    pub fn set_texture(&mut self, texture: Option<PageTexture>) -> Option<PageTexture> {
        std::mem::replace(&mut self.texture, texture)
    }

    pub fn texture(&self) -> Option<&PageTexture> {
        self.texture.as_ref()
    }

    pub fn take_texture(&mut self) -> Option<PageTexture> {
        self.texture.take()
    }

    pub fn has_texture(&self) -> bool {
        self.texture.is_some()
    }
}

pub struct GalleryPageView {
    pub progress: ProgressIndicator,
    pub label: IndexLabel,
    pub image: ImageSurface,
    state: PageState,
}

impl GalleryPageView {
    pub fn new() -> Self {
        Self {
            progress: ProgressIndicator {
                visible: false,
                indeterminate: false,
                value: 0.0,
            },
            label: IndexLabel {
                visible: true,
                text: String::new(),
            },
            image: ImageSurface::default(),
            state: PageState::Empty,
        }
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: PageState) {
        self.state = state;
    }

    /// Back to the initial configuration: no progress, no image, label
    /// visible. The texture must already have been taken by the caller.
    pub(crate) fn reset(&mut self) {
        debug_assert!(!self.image.has_texture());
        self.progress.visible = false;
        self.progress.indeterminate = false;
        self.progress.value = 0.0;
        self.label.visible = true;
        self.label.text.clear();
        self.state = PageState::Empty;
    }
}

impl Default for GalleryPageView {
    fn default() -> Self {
        Self::new()
    }
}

/// The seam between the paging container and the page-state controller.
pub trait GalleryAdapter {
    /// Pages the container should present (1 in placeholder mode).
    fn page_count(&self) -> usize;
    fn create_page(&self) -> GalleryPageView;
    fn bind_page(&mut self, view: &mut GalleryPageView, index: usize);
    fn unbind_page(&mut self, view: &mut GalleryPageView, index: usize);
}

/// Paging container holding the instantiated page window.
#[derive(Default)]
pub struct GalleryView {
    pages: BTreeMap<usize, GalleryPageView>,
}

impl GalleryView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the visible window. Pages scrolled out are unbound and
    /// recycled; pages scrolled in are created and bound.
    pub fn set_window(&mut self, range: Range<usize>, adapter: &mut dyn GalleryAdapter) {
        let count = adapter.page_count();
        let range = range.start.min(count)..range.end.min(count);

        let gone: Vec<usize> = self
            .pages
            .keys()
            .copied()
            .filter(|i| !range.contains(i))
            .collect();
        for index in gone {
            if let Some(mut page) = self.pages.remove(&index) {
                adapter.unbind_page(&mut page, index);
            }
        }

        for index in range {
            if !self.pages.contains_key(&index) {
                let mut page = adapter.create_page();
                adapter.bind_page(&mut page, index);
                self.pages.insert(index, page);
            }
        }
    }

    /// The bound view for a page, or `None` when it is scrolled out.
    pub fn page_mut(&mut self, index: usize) -> Option<&mut GalleryPageView> {
        self.pages.get_mut(&index)
    }

    pub fn page(&self, index: usize) -> Option<&GalleryPageView> {
        self.pages.get(&index)
    }

    pub fn pages_mut(&mut self) -> impl Iterator<Item = (usize, &mut GalleryPageView)> + '_ {
        self.pages.iter_mut().map(|(i, p)| (*i, p))
    }

    pub fn page_indices(&self) -> Vec<usize> {
        self.pages.keys().copied().collect()
    }

    pub fn component_count(&self) -> usize {
        self.pages.len()
    }
}
