//! Clip registry adapter and the resolved-clip library.
//!
//! The registry is the external asset service: `resolve` returns a future for
//! the clip bytes. [`ClipLibrary`] polls those futures with a no-op waker once
//! per frame, so a pending fetch never blocks the frame loop.

use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use hashbrown::HashMap;

use crate::clip::ClipData;
use crate::outputs::Status;

/// External clip asset service.
pub trait ClipRegistry {
    /// Whether the service can take requests yet.
    fn is_ready(&self) -> bool {
        true
    }

    /// Fetch the JSON bytes for `slug`; `None` when the asset does not exist.
    fn resolve(&mut self, slug: &str) -> LocalBoxFuture<'static, Option<Vec<u8>>>;
}

/// Result of [`ClipLibrary::poll`].
#[derive(Clone, Debug)]
pub enum ClipStatus {
    Ready(Arc<ClipData>),
    Pending,
    Missing(String),
}

enum Entry {
    Pending(LocalBoxFuture<'static, Option<Vec<u8>>>),
    Ready(Arc<ClipData>),
}

/// Cache of resolved clips keyed by slug, plus in-flight fetches.
#[derive(Default)]
pub struct ClipLibrary {
    registry: Option<Box<dyn ClipRegistry>>,
    entries: HashMap<String, Entry>,
    /// Failures settled by `poll_pending`, reported once by the next `poll`.
    failures: HashMap<String, String>,
    status: Status,
    status_changes: Vec<Status>,
}

impl std::fmt::Debug for ClipLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipLibrary")
            .field("has_registry", &self.registry.is_some())
            .field("entries", &self.entries.len())
            .field("pending", &self.pending_count())
            .field("status", &self.status)
            .finish()
    }
}

impl ClipLibrary {
    pub fn new(registry: Box<dyn ClipRegistry>) -> Self {
        Self {
            registry: Some(registry),
            ..Self::default()
        }
    }

    /// Library with preloaded clips only.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn set_registry(&mut self, registry: Box<dyn ClipRegistry>) {
        self.cancel_pending();
        self.registry = Some(registry);
    }

    /// Add an already-decoded clip under `slug`.
    pub fn insert(&mut self, slug: impl Into<String>, clip: ClipData) -> Arc<ClipData> {
        let clip = Arc::new(clip);
        self.entries.insert(slug.into(), Entry::Ready(clip.clone()));
        clip
    }

    pub fn get(&self, slug: &str) -> Option<Arc<ClipData>> {
        match self.entries.get(slug) {
            Some(Entry::Ready(clip)) => Some(clip.clone()),
            _ => None,
        }
    }

    /// Look up `slug`, starting a fetch if needed. Never blocks.
    pub fn poll(&mut self, slug: &str) -> ClipStatus {
        if let Some(reason) = self.failures.remove(slug) {
            return ClipStatus::Missing(reason);
        }
        if !self.entries.contains_key(slug) {
            let Some(registry) = self.registry.as_mut() else {
                return ClipStatus::Missing(format!("clip '{slug}' is not loaded"));
            };
            if !registry.is_ready() {
                return ClipStatus::Missing("clip registry is not ready".to_string());
            }
            tracing::debug!(slug, "resolving clip");
            let fut = registry.resolve(slug);
            self.entries.insert(slug.to_string(), Entry::Pending(fut));
            self.set_status(Status::Loading);
        }
        let status = self.poll_entry(slug);
        if matches!(status, ClipStatus::Missing(_)) {
            self.failures.remove(slug);
        }
        status
    }

    /// Drive every in-flight fetch one step.
    pub fn poll_pending(&mut self) {
        let pending: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| matches!(e, Entry::Pending(_)))
            .map(|(k, _)| k.clone())
            .collect();
        for slug in pending {
            self.poll_entry(&slug);
        }
    }

    /// Drop every in-flight fetch (the futures are cancelled by dropping them).
    pub fn cancel_pending(&mut self) {
        self.failures.clear();
        let before = self.entries.len();
        self.entries.retain(|_, e| matches!(e, Entry::Ready(_)));
        if self.entries.len() != before {
            tracing::debug!(cancelled = before - self.entries.len(), "cancelled clip fetches");
            if self.status == Status::Loading {
                self.set_status(Status::Idle);
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| matches!(e, Entry::Pending(_)))
            .count()
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Status transitions since the last call, oldest first.
    pub fn drain_status_changes(&mut self) -> Vec<Status> {
        std::mem::take(&mut self.status_changes)
    }

    fn poll_entry(&mut self, slug: &str) -> ClipStatus {
        let polled = match self.entries.get_mut(slug) {
            None => return ClipStatus::Missing(format!("clip '{slug}' is not loaded")),
            Some(Entry::Ready(clip)) => return ClipStatus::Ready(clip.clone()),
            Some(Entry::Pending(fut)) => {
                let mut cx = Context::from_waker(futures::task::noop_waker_ref());
                fut.poll_unpin(&mut cx)
            }
        };
        match polled {
            Poll::Pending => ClipStatus::Pending,
            Poll::Ready(bytes) => self.settle(slug, bytes),
        }
    }

    fn settle(&mut self, slug: &str, bytes: Option<Vec<u8>>) -> ClipStatus {
        let decoded = match bytes {
            None => Err(format!("clip '{slug}' not found")),
            Some(bytes) => ClipData::from_slice(&bytes)
                .map_err(|e| format!("clip '{slug}' failed to load: {e}")),
        };
        match decoded {
            Ok(clip) => {
                tracing::debug!(slug, "clip resolved");
                let clip = Arc::new(clip);
                self.entries.insert(slug.to_string(), Entry::Ready(clip.clone()));
                if self.pending_count() == 0 {
                    self.set_status(Status::Ready);
                }
                ClipStatus::Ready(clip)
            }
            Err(message) => {
                tracing::warn!(slug, %message, "clip resolution failed");
                // Failures are not cached so a later request can retry.
                self.entries.remove(slug);
                self.failures.insert(slug.to_string(), message.clone());
                self.set_status(Status::Error {
                    message: message.clone(),
                });
                ClipStatus::Missing(message)
            }
        }
    }

    fn set_status(&mut self, status: Status) {
        if self.status != status {
            self.status = status.clone();
            self.status_changes.push(status);
        }
    }
}
