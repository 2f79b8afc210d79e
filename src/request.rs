//! Startup request contract: how a host activates the gallery core.
//!
//! Resolution either yields a working provider or fails before anything is
//! acquired, so the host can close immediately with no teardown to run.

use std::path::PathBuf;
use std::sync::Arc;

use crate::decode::DecodePool;
use crate::error::{GalleryError, Result};
use crate::provider::{
    ArchiveProvider, FetchMode, GalleryProvider, GalleryRecord, SpiderRegistry,
};

/// The two request shapes the core accepts.
#[derive(Debug, Clone)]
pub enum GalleryRequest {
    /// A serialized gallery-base record, resolved to a spider session.
    FromRecord { record: String },
    /// A local archive file.
    FromArchive { path: PathBuf },
}

/// Shared resources a request resolves against.
pub struct ResolveContext {
    pub decode: Arc<DecodePool>,
    pub spiders: Option<Arc<SpiderRegistry>>,
}

/// Resolve a startup request into a provider.
pub fn resolve(request: GalleryRequest, ctx: &ResolveContext) -> Result<Box<dyn GalleryProvider>> {
    match request {
        GalleryRequest::FromRecord { record } => {
            let Some(spiders) = ctx.spiders.as_ref() else {
                return Err(GalleryError::UnrecognizedRequest);
            };
            let record: GalleryRecord = serde_json::from_str(&record)?;
            // TODO: plumb the fetch mode from the request instead of
            // defaulting to download.
            Ok(Box::new(spiders.obtain(record, FetchMode::Download)))
        }
        GalleryRequest::FromArchive { path } => Ok(Box::new(ArchiveProvider::open(
            &path,
            Arc::clone(&ctx.decode),
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ResolveContext {
        ResolveContext {
            decode: Arc::new(DecodePool::new()),
            spiders: None,
        }
    }

    #[test]
    fn missing_archive_fails_before_activation() {
        let err = resolve(
            GalleryRequest::FromArchive {
                path: PathBuf::from("/no/such/archive.zip"),
            },
            &ctx(),
        );
        assert!(matches!(err, Err(GalleryError::ArchiveOpen(_))));
    }

    #[test]
    fn malformed_record_fails() {
        let err = resolve(
            GalleryRequest::FromRecord {
                record: "not json".into(),
            },
            &ResolveContext {
                decode: Arc::new(DecodePool::new()),
                spiders: Some(Arc::new(SpiderRegistry::new(Box::new(|_, _| {
                    unreachable!("factory must not run for a malformed record")
                })))),
            },
        );
        assert!(matches!(err, Err(GalleryError::InvalidRecord(_))));
    }

    #[test]
    fn record_without_registry_is_unrecognized() {
        let err = resolve(
            GalleryRequest::FromRecord {
                record: r#"{"id": 1, "token": "t"}"#.into(),
            },
            &ctx(),
        );
        assert!(matches!(err, Err(GalleryError::UnrecognizedRequest)));
    }
}
