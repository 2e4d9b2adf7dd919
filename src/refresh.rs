//! Forces a viewport redraw after a configuration change.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

/// Something that can ask the host to draw another frame.
pub trait RedrawRequester: Send + Sync {
    fn request_redraw(&self);
}

impl RedrawRequester for winit::window::Window {
    fn request_redraw(&self) {
        winit::window::Window::request_redraw(self);
    }
}

struct FnRequester<F>(F);

impl<F: Fn() + Send + Sync> RedrawRequester for FnRequester<F> {
    fn request_redraw(&self) {
        (self.0)();
    }
}

/// Coalescing redraw trigger.
///
/// Only the first request after a frame starts is forwarded to the host;
/// later ones are absorbed until [`frame_begun`](Self::frame_begun) re-arms
/// the trigger. The host decides when the redraw actually happens.
#[derive(Default)]
pub struct RefreshTrigger {
    requester: Mutex<Option<Arc<dyn RedrawRequester>>>,
    pending: AtomicBool,
    forwarded: AtomicU64,
}

impl RefreshTrigger {
    /// A trigger with no host attached yet. Requests are still counted.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn new(requester: Arc<dyn RedrawRequester>) -> Self {
        let trigger = Self::default();
        trigger.attach(requester);
        trigger
    }

    pub fn from_fn(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self::new(Arc::new(FnRequester(f)))
    }

    /// Replaces the host requester.
    pub fn attach(&self, requester: Arc<dyn RedrawRequester>) {
        *self.requester.lock() = Some(requester);
    }

    /// Asks for one redraw. Returns `true` if the request was forwarded.
    pub fn request_refresh(&self) -> bool {
        if self.pending.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.forwarded.fetch_add(1, Ordering::Relaxed);
        let requester = self.requester.lock().clone();
        if let Some(requester) = requester {
            requester.request_redraw();
        }
        true
    }

    /// Called by the frame loop; the next request will be forwarded again.
    pub fn frame_begun(&self) {
        self.pending.store(false, Ordering::Release);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Number of redraws forwarded to the host so far.
    pub fn redraws_requested(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn requests_coalesce_until_next_frame() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let trigger = RefreshTrigger::from_fn(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(trigger.request_refresh());
        assert!(!trigger.request_refresh());
        assert!(!trigger.request_refresh());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        trigger.frame_begun();
        assert!(trigger.request_refresh());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(trigger.redraws_requested(), 2);
    }

    #[test]
    fn detached_trigger_still_counts() {
        let trigger = RefreshTrigger::detached();
        trigger.request_refresh();
        assert!(trigger.is_pending());
        assert_eq!(trigger.redraws_requested(), 1);
    }
}
