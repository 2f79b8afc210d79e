//! Remote-spider-backed gallery provider.
//!
//! Spider sessions are reference counted in an explicit registry so several
//! viewers of the same gallery share one fetch engine. The engine itself
//! (network, on-disk image store) sits behind the `PageFetcher` trait.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::payload::{DecodedPayload, PageResult};

use super::{BitmapPool, EventSender, GalleryProvider};

/// Identity of a remote gallery, as carried by a startup request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryRecord {
    pub id: u64,
    pub token: String,
    #[serde(default)]
    pub title: String,
}

/// How fetched pages are stored by the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FetchMode {
    #[default]
    Download,
    Cache,
}

/// The fetch engine behind a spider session. Network I/O and page storage
/// live behind this seam.
pub trait PageFetcher: Send + Sync + 'static {
    /// Total pages if already known, `<= 0` otherwise.
    fn size(&self) -> isize;
    /// Begin asynchronous materialization of a page. Results arrive
    /// through `events`.
    fn start(&self, index: usize, events: EventSender);
    /// Immediate state of a page.
    fn poll(&self, index: usize) -> PageResult;
    /// Stop all work; called when the last session reference goes.
    fn stop(&self);
}

type FetcherFactory =
    Box<dyn Fn(&GalleryRecord, FetchMode) -> Arc<dyn PageFetcher> + Send + Sync>;

struct Session {
    fetcher: Arc<dyn PageFetcher>,
    refs: usize,
}

/// Reference-counted spider sessions keyed by gallery id.
pub struct SpiderRegistry {
    factory: FetcherFactory,
    sessions: Mutex<HashMap<u64, Session>>,
}

impl SpiderRegistry {
    pub fn new(factory: FetcherFactory) -> Self {
        Self {
            factory,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Obtain a provider for a gallery, creating the session on first use
    /// and bumping its refcount otherwise.
    pub fn obtain(
        self: &Arc<Self>,
        record: GalleryRecord,
        mode: FetchMode,
    ) -> SpiderProvider {
        let fetcher = {
            let mut sessions = self.sessions.lock().unwrap();
            let session = sessions.entry(record.id).or_insert_with(|| {
                log::info!("starting spider session for gallery {} ({:?})", record.id, mode);
                Session {
                    fetcher: (self.factory)(&record, mode),
                    refs: 0,
                }
            });
            session.refs += 1;
            Arc::clone(&session.fetcher)
        };
        SpiderProvider {
            id: record.id,
            registry: Arc::clone(self),
            fetcher,
            listener: Mutex::new(None),
            bitmaps: BitmapPool::new(),
        }
    }

    fn release(&self, id: u64) {
        let mut sessions = self.sessions.lock().unwrap();
        let Some(session) = sessions.get_mut(&id) else {
            log::warn!("release of unknown spider session {id}");
            return;
        };
        session.refs -= 1;
        if session.refs == 0 {
            session.fetcher.stop();
            sessions.remove(&id);
            log::info!("stopped spider session for gallery {id}");
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

pub struct SpiderProvider {
    id: u64,
    registry: Arc<SpiderRegistry>,
    fetcher: Arc<dyn PageFetcher>,
    listener: Mutex<Option<EventSender>>,
    bitmaps: BitmapPool,
}

impl SpiderProvider {
    pub fn pooled_bitmaps(&self) -> usize {
        self.bitmaps.len()
    }
}

impl GalleryProvider for SpiderProvider {
    fn size(&self) -> isize {
        self.fetcher.size()
    }

    fn request(&self, index: usize) -> PageResult {
        match self.fetcher.poll(index) {
            PageResult::None => {
                if let Some(listener) = self.listener.lock().unwrap().as_ref() {
                    self.fetcher.start(index, listener.clone());
                }
                PageResult::None
            }
            other => other,
        }
    }

    fn release_payload(&self, payload: DecodedPayload) {
        self.bitmaps.put_payload(payload);
    }

    fn set_listener(&self, listener: Option<EventSender>) {
        *self.listener.lock().unwrap() = listener;
    }

    fn release(self: Box<Self>) {
        self.registry.release(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct MockFetcher {
        starts: AtomicUsize,
        stopped: AtomicBool,
    }

    impl PageFetcher for MockFetcher {
        fn size(&self) -> isize {
            0
        }
        fn start(&self, _index: usize, _events: EventSender) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
        fn poll(&self, _index: usize) -> PageResult {
            PageResult::None
        }
        fn stop(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    fn registry() -> (Arc<SpiderRegistry>, Arc<MockFetcher>) {
        let fetcher = Arc::new(MockFetcher::default());
        let handle = Arc::clone(&fetcher);
        let registry = Arc::new(SpiderRegistry::new(Box::new(move |_, _| {
            Arc::clone(&handle) as Arc<dyn PageFetcher>
        })));
        (registry, fetcher)
    }

    fn record() -> GalleryRecord {
        GalleryRecord {
            id: 42,
            token: "deadbeef".into(),
            title: "test".into(),
        }
    }

    #[test]
    fn sessions_are_shared_and_refcounted() {
        let (registry, fetcher) = registry();
        let a = registry.obtain(record(), FetchMode::Download);
        let b = registry.obtain(record(), FetchMode::Download);
        assert_eq!(registry.session_count(), 1);

        Box::new(a).release();
        assert_eq!(registry.session_count(), 1);
        assert!(!fetcher.stopped.load(Ordering::SeqCst));

        Box::new(b).release();
        assert_eq!(registry.session_count(), 0);
        assert!(fetcher.stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn request_starts_fetch_when_listener_attached() {
        let (registry, fetcher) = registry();
        let provider = registry.obtain(record(), FetchMode::Download);

        // No listener, nothing to deliver to: do not start the fetch.
        provider.request(0);
        assert_eq!(fetcher.starts.load(Ordering::SeqCst), 0);

        let (tx, _rx) = super::super::event_channel();
        provider.set_listener(Some(tx));
        provider.request(0);
        assert_eq!(fetcher.starts.load(Ordering::SeqCst), 1);
        Box::new(provider).release();
    }

    #[test]
    fn record_round_trips_through_json() {
        let json = serde_json::to_string(&record()).unwrap();
        let parsed: GalleryRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record());
    }
}
