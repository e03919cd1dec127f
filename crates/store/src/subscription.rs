//! Live subscriptions as cancellable streams
//!
//! A [`Subscription`] is pulled like any other [`Stream`]. Unsubscribing is
//! explicit and synchronous: once [`Unsubscriber::unsubscribe`] returns, the
//! store holds no listener for it and will deliver nothing more.

use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use futures::Stream;
use syncnote_protocol::DocumentPath;
use tokio::sync::mpsc;

use crate::backend::SnapshotEvent;

type CancelFn = Box<dyn FnOnce() + Send>;

struct UnsubscribeInner {
    done: AtomicBool,
    cancel: Mutex<Option<CancelFn>>,
}

/// Cloneable handle that releases a subscription's listener
#[derive(Clone)]
pub struct Unsubscriber {
    inner: Arc<UnsubscribeInner>,
}

impl Unsubscriber {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner: Arc::new(UnsubscribeInner {
                done: AtomicBool::new(false),
                cancel: Mutex::new(Some(Box::new(cancel))),
            }),
        }
    }

    /// Handle with nothing to release (for stores without listener registries)
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// Release the listener. Idempotent.
    pub fn unsubscribe(&self) {
        self.inner.done.store(true, Ordering::SeqCst);
        let cancel = self
            .inner
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    pub fn is_unsubscribed(&self) -> bool {
        self.inner.done.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Unsubscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscriber")
            .field("unsubscribed", &self.is_unsubscribed())
            .finish()
    }
}

/// Open live query on one document
///
/// Dropping the subscription unsubscribes it.
pub struct Subscription {
    path: DocumentPath,
    rx: mpsc::UnboundedReceiver<SnapshotEvent>,
    unsubscriber: Unsubscriber,
}

impl Subscription {
    pub fn new(
        path: DocumentPath,
        rx: mpsc::UnboundedReceiver<SnapshotEvent>,
        unsubscriber: Unsubscriber,
    ) -> Self {
        Self {
            path,
            rx,
            unsubscriber,
        }
    }

    pub const fn path(&self) -> &DocumentPath {
        &self.path
    }

    /// Handle that can release this subscription from elsewhere
    pub fn unsubscriber(&self) -> Unsubscriber {
        self.unsubscriber.clone()
    }

    pub fn unsubscribe(self) {
        self.unsubscriber.unsubscribe();
    }

    /// Next snapshot or error, `None` once unsubscribed and drained
    pub async fn next_event(&mut self) -> Option<SnapshotEvent> {
        if self.unsubscriber.is_unsubscribed() {
            return None;
        }
        self.rx.recv().await
    }
}

impl Stream for Subscription {
    type Item = SnapshotEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.unsubscriber.is_unsubscribed() {
            return Poll::Ready(None);
        }
        this.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscriber.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("path", &self.path)
            .field("unsubscriber", &self.unsubscriber)
            .finish_non_exhaustive()
    }
}
