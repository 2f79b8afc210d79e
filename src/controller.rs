//! Page-state controller: the single authority translating provider events
//! and bind/unbind calls into page-view state and texture ownership.
//!
//! All mutation happens on the thread that calls `pump`, `set_window` and
//! friends; provider threads only ever touch the event channel. Every
//! texture the controller creates is registered with the uploader before
//! first use and recycled exactly once: on replacement, on unbind, or at
//! shutdown.

use std::sync::Arc;
use std::sync::mpsc::Receiver;

use crate::decode::DecodePool;
use crate::payload::{DecodedPayload, PageResult};
use crate::provider::{GalleryProvider, ProviderEvent, event_channel};
use crate::texture::{AnimatedTexture, PageTexture, TiledTexture, Uploader};
use crate::view::{GalleryAdapter, GalleryPageView, GalleryView, LayoutMode, PageState};

/// What to do when the provider reports gallery-level failure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log and keep going.
    #[default]
    LogOnly,
    /// Mark every currently bound page as failed.
    FailBoundPages,
}

pub struct PageStateController {
    provider: Option<Box<dyn GalleryProvider>>,
    events: Receiver<ProviderEvent>,
    uploader: Uploader,
    decode: Arc<DecodePool>,
    mode: LayoutMode,
    size: isize,
    failure_policy: FailurePolicy,
    torn_down: bool,
}

impl PageStateController {
    /// Activate the controller over a resolved provider. Registers the
    /// event listener and picks the initial layout mode from the
    /// provider's current size.
    pub fn new(
        provider: Box<dyn GalleryProvider>,
        uploader: Uploader,
        decode: Arc<DecodePool>,
        failure_policy: FailurePolicy,
    ) -> Self {
        let (sender, events) = event_channel();
        provider.set_listener(Some(sender));
        let size = provider.size();
        let mode = if size <= 0 {
            LayoutMode::Placeholder
        } else {
            LayoutMode::Paged
        };
        log::info!("gallery controller active, size {size}, mode {mode:?}");
        Self {
            provider: Some(provider),
            events,
            uploader,
            decode,
            mode,
            size,
            failure_policy,
            torn_down: false,
        }
    }

    pub fn mode(&self) -> LayoutMode {
        self.mode
    }

    pub fn size(&self) -> isize {
        self.size
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Drain the provider event channel and apply every transition on the
    /// calling thread. Returns the number of events handled. No-op once
    /// torn down.
    pub fn pump(&mut self, view: &mut GalleryView) -> usize {
        if self.torn_down {
            return 0;
        }
        let mut pending = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            pending.push(event);
        }
        let handled = pending.len();
        for event in pending {
            self.dispatch(view, event);
        }
        handled
    }

    fn dispatch(&mut self, view: &mut GalleryView, event: ProviderEvent) {
        match event {
            ProviderEvent::Size(size) => self.on_size(size),
            ProviderEvent::Image { index, payload } => self.on_image(view, index, payload),
            ProviderEvent::Percent { index, percent } => self.on_percent(view, index, percent),
            ProviderEvent::PageSucceed(index) => self.on_page_succeed(view, index),
            ProviderEvent::PageFailed { index, error } => {
                self.on_page_failed(view, index, &error)
            }
            ProviderEvent::TotallyFailed(error) => self.on_gallery_failure(view, &error, true),
            ProviderEvent::PartlyFailed(error) => self.on_gallery_failure(view, &error, false),
        }
    }

    fn on_size(&mut self, size: isize) {
        if size == self.size {
            return;
        }
        self.size = size;
        if size > 0 && self.mode == LayoutMode::Placeholder {
            self.mode = LayoutMode::Paged;
            log::info!("page count known: {size}, switching to paged layout");
        }
    }

    fn on_image(&mut self, view: &mut GalleryView, index: usize, payload: Option<DecodedPayload>) {
        match view.page_mut(index) {
            Some(page) => match payload {
                Some(payload) => self.bind_image(page, payload),
                None => {
                    log::debug!("page {index} delivered no payload");
                    self.bind_failed(page);
                }
            },
            None => {
                // Scrolled out before the decode finished; hand the
                // payload straight back.
                if let Some(payload) = payload {
                    self.release_payload(payload);
                }
            }
        }
    }

    fn on_percent(&mut self, view: &mut GalleryView, index: usize, percent: f32) {
        if let Some(page) = view.page_mut(index) {
            self.bind_percent(page, percent);
        }
    }

    fn on_page_succeed(&mut self, view: &mut GalleryView, index: usize) {
        if let Some(page) = view.page_mut(index) {
            self.bind(page, index);
        }
    }

    fn on_page_failed(&mut self, view: &mut GalleryView, index: usize, error: &str) {
        log::debug!("page {index} failed: {error}");
        if let Some(page) = view.page_mut(index) {
            self.bind_failed(page);
        }
    }

    fn on_gallery_failure(&mut self, view: &mut GalleryView, error: &str, total: bool) {
        let kind = if total { "totally" } else { "partly" };
        match self.failure_policy {
            FailurePolicy::LogOnly => log::warn!("gallery {kind} failed: {error}"),
            FailurePolicy::FailBoundPages => {
                log::warn!("gallery {kind} failed, failing bound pages: {error}");
                for index in view.page_indices() {
                    if let Some(page) = view.page_mut(index) {
                        self.bind_failed(page);
                    }
                }
            }
        }
    }

    /// Route the provider's immediate answer for a page into the matching
    /// display state.
    fn bind(&self, page: &mut GalleryPageView, index: usize) {
        let Some(provider) = self.provider.as_ref() else {
            return;
        };
        match provider.request(index) {
            PageResult::Progress(percent) => self.bind_percent(page, percent),
            PageResult::Wait => {}
            PageResult::None => self.bind_none(page),
            PageResult::Failed => self.bind_failed(page),
            PageResult::Ready(payload) => self.bind_image(page, payload),
            PageResult::Unknown => self.bind_unknown(page),
        }
    }

    fn bind_image(&self, page: &mut GalleryPageView, payload: DecodedPayload) {
        let texture = match payload {
            DecodedPayload::Static(img) => {
                let texture = TiledTexture::new(DecodedPayload::Static(img));
                self.uploader.add_texture(&texture);
                PageTexture::Static(texture)
            }
            DecodedPayload::Animated { frames, thumbnail } => {
                let texture = AnimatedTexture::new(frames, thumbnail);
                self.uploader.add_texture(texture.tiled());
                PageTexture::Animated(texture)
            }
        };
        if let Some(previous) = page.image.set_texture(Some(texture)) {
            if let Some(payload) = previous.recycle() {
                self.release_payload(payload);
            }
        }
        page.progress.visible = false;
        page.label.visible = false;
        page.set_state(PageState::Ready);
    }

    fn bind_percent(&self, page: &mut GalleryPageView, percent: f32) {
        self.clear_texture(page);
        page.progress.visible = true;
        page.progress.indeterminate = false;
        page.progress.value = percent;
        page.label.visible = true;
        page.set_state(PageState::Loading(percent));
    }

    fn bind_none(&self, page: &mut GalleryPageView) {
        self.clear_texture(page);
        page.progress.visible = true;
        page.progress.indeterminate = true;
        page.label.visible = true;
        page.set_state(PageState::Empty);
    }

    fn bind_failed(&self, page: &mut GalleryPageView) {
        self.clear_texture(page);
        page.progress.visible = false;
        page.label.visible = true;
        page.set_state(PageState::Failed);
    }

    fn bind_unknown(&self, page: &mut GalleryPageView) {
        self.clear_texture(page);
        page.progress.visible = false;
        page.label.visible = true;
        page.set_state(PageState::Unknown);
    }

    /// Empty the page's texture slot, recycling the texture and returning
    /// its payload to the provider. No-op on an empty slot.
    fn clear_texture(&self, page: &mut GalleryPageView) {
        if let Some(texture) = page.image.take_texture() {
            if let Some(payload) = texture.recycle() {
                self.release_payload(payload);
            }
        }
    }

    fn release_payload(&self, payload: DecodedPayload) {
        match self.provider.as_ref() {
            Some(provider) => provider.release_payload(payload),
            // Provider already released; the buffers just drop.
            None => drop(payload),
        }
    }

    fn unbind(&mut self, page: &mut GalleryPageView, index: usize) {
        log::debug!("unbinding page {index}");
        page.progress.indeterminate = false;
        self.clear_texture(page);
        page.reset();
    }

    /// Tear everything down. Idempotent; later `pump` calls are no-ops.
    ///
    /// Order matters: detach the listener, drain events already in flight
    /// (their payloads go back to the provider), clear the upload queue,
    /// stop the decode pool, release the provider, then force-recycle every
    /// texture still held by an instantiated page.
    pub fn shutdown(&mut self, view: &mut GalleryView) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        log::info!("shutting down gallery controller");

        if let Some(provider) = self.provider.as_ref() {
            provider.set_listener(None);
            while let Ok(event) = self.events.try_recv() {
                if let ProviderEvent::Image {
                    payload: Some(payload),
                    ..
                } = event
                {
                    provider.release_payload(payload);
                }
            }
        }

        self.uploader.clear();
        self.decode.shutdown();

        if let Some(provider) = self.provider.take() {
            provider.release();
        }

        for (_, page) in view.pages_mut() {
            if let Some(texture) = page.image.take_texture() {
                texture.recycle();
            }
            page.reset();
        }
    }
}

impl GalleryAdapter for PageStateController {
    fn page_count(&self) -> usize {
        match self.mode {
            LayoutMode::Placeholder => 1,
            LayoutMode::Paged => self.size.max(0) as usize,
        }
    }

    fn create_page(&self) -> GalleryPageView {
        GalleryPageView::new()
    }

    fn bind_page(&mut self, view: &mut GalleryPageView, index: usize) {
        view.label.text = (index + 1).to_string();
        view.label.visible = true;
        self.bind(view, index);
    }

    fn unbind_page(&mut self, view: &mut GalleryPageView, index: usize) {
        self.unbind(view, index);
    }
}
