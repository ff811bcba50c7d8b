use std::cell::RefCell;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use vizij_avatar_core::ClipRegistry;

use crate::clips;

/// Resolves manifest clips on the first poll.
#[derive(Debug, Default)]
pub struct FixtureRegistry {
    requests: Rc<RefCell<Vec<String>>>,
}

impl FixtureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared log of requested slugs (survives boxing the registry).
    pub fn requests(&self) -> Rc<RefCell<Vec<String>>> {
        self.requests.clone()
    }
}

impl ClipRegistry for FixtureRegistry {
    fn resolve(&mut self, slug: &str) -> LocalBoxFuture<'static, Option<Vec<u8>>> {
        self.requests.borrow_mut().push(slug.to_string());
        futures::future::ready(clips::bytes(slug).ok()).boxed_local()
    }
}

type Waiting = Vec<(String, oneshot::Sender<Option<Vec<u8>>>)>;

/// Registry whose fetches stay pending until the test completes them through
/// the paired [`DeferredControl`].
#[derive(Debug)]
pub struct DeferredRegistry {
    waiting: Rc<RefCell<Waiting>>,
    ready: Rc<RefCell<bool>>,
}

#[derive(Debug, Clone)]
pub struct DeferredControl {
    waiting: Rc<RefCell<Waiting>>,
    ready: Rc<RefCell<bool>>,
}

impl DeferredRegistry {
    pub fn new() -> (Self, DeferredControl) {
        let waiting = Rc::new(RefCell::new(Vec::new()));
        let ready = Rc::new(RefCell::new(true));
        (
            Self {
                waiting: waiting.clone(),
                ready: ready.clone(),
            },
            DeferredControl { waiting, ready },
        )
    }
}

impl ClipRegistry for DeferredRegistry {
    fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    fn resolve(&mut self, slug: &str) -> LocalBoxFuture<'static, Option<Vec<u8>>> {
        let (tx, rx) = oneshot::channel();
        self.waiting.borrow_mut().push((slug.to_string(), tx));
        rx.map(|r| r.ok().flatten()).boxed_local()
    }
}

impl DeferredControl {
    pub fn set_ready(&self, ready: bool) {
        *self.ready.borrow_mut() = ready;
    }

    /// Slugs with a fetch in flight.
    pub fn waiting(&self) -> Vec<String> {
        self.waiting.borrow().iter().map(|(s, _)| s.clone()).collect()
    }

    /// Deliver the manifest bytes for `slug`. Returns false if nothing waited.
    pub fn complete(&self, slug: &str) -> bool {
        self.finish(slug, clips::bytes(slug).ok())
    }

    /// Resolve `slug` as a missing asset.
    pub fn fail(&self, slug: &str) -> bool {
        self.finish(slug, None)
    }

    fn finish(&self, slug: &str, bytes: Option<Vec<u8>>) -> bool {
        let mut waiting = self.waiting.borrow_mut();
        let Some(pos) = waiting.iter().position(|(s, _)| s == slug) else {
            return false;
        };
        let (_, tx) = waiting.remove(pos);
        tx.send(bytes).is_ok()
    }
}
