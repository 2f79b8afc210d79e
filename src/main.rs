//! Headless demo driver: opens a zip archive as a gallery, binds the first
//! pages and pumps the pipeline until every page settles, printing the
//! resulting per-page states.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use yomu::{
    DecodePool, FailurePolicy, GalleryRequest, GalleryView, PageState, PageStateController,
    ResolveContext, Uploader, resolve,
};

const WINDOW: usize = 5;
const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

fn main() {
    env_logger::init();

    let Some(path) = std::env::args().nth(1).map(PathBuf::from) else {
        eprintln!("usage: yomu <archive.zip>");
        std::process::exit(2);
    };

    let decode = Arc::new(DecodePool::new());
    let ctx = ResolveContext {
        decode: Arc::clone(&decode),
        spiders: None,
    };
    let provider = match resolve(GalleryRequest::FromArchive { path }, &ctx) {
        Ok(provider) => provider,
        Err(e) => {
            // Nothing was acquired; close immediately with no teardown.
            eprintln!("failed to open gallery: {e}");
            std::process::exit(1);
        }
    };

    let uploader = Uploader::new();
    let mut controller = PageStateController::new(
        provider,
        uploader.clone(),
        decode,
        FailurePolicy::default(),
    );
    let mut view = GalleryView::new();
    let total = controller.size().max(0) as usize;
    view.set_window(0..WINDOW.min(total.max(1)), &mut controller);

    let deadline = Instant::now() + SETTLE_TIMEOUT;
    loop {
        controller.pump(&mut view);
        uploader.process();
        let settled = view
            .page_indices()
            .into_iter()
            .all(|i| {
                matches!(
                    view.page(i).map(|p| p.state()),
                    Some(PageState::Ready | PageState::Failed | PageState::Unknown)
                )
            });
        if settled || Instant::now() > deadline {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    println!("gallery: {total} pages");
    for index in view.page_indices() {
        if let Some(page) = view.page(index) {
            println!("  page {:>3}: {:?}", index + 1, page.state());
        }
    }

    controller.shutdown(&mut view);
}
