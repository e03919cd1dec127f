//! Synchronized document widgets
//!
//! A widget mirrors one remote document into a local buffer. The moving parts
//! are shared by both widget kinds:
//! - a [`SyncView`] published through a `watch` channel (what the UI renders)
//! - a pump task that drains the store subscription into the view
//! - a detach switch that releases the subscription synchronously and
//!   freezes the view, so nothing lands on a widget after unmount
//!
//! ```text
//! Unattached -> Attached -> Synced <-> Saving -> Synced | Errored
//!      \___________\__________\___________\______-> Detached
//! ```

pub mod collection;
pub mod scalar;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use syncnote_store::{SnapshotEvent, Subscription, Unsubscriber};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{LoadError, WidgetError};

/// Lifecycle phase of a widget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Unattached,
    /// Subscribed, no snapshot yet
    Attached,
    Synced,
    Saving,
    /// Last operation failed; the widget stays usable
    Errored,
    /// Terminal
    Detached,
}

/// What a widget shows
#[derive(Debug, Clone, PartialEq)]
pub struct SyncView<T> {
    pub phase: Phase,
    pub buffer: T,
    /// An exclusive write (save, clear) is in flight
    pub busy: bool,
    /// Writes and uploads in flight, exclusive or not
    pub in_flight: usize,
    pub error: Option<WidgetError>,
    /// Remote snapshots applied so far
    pub snapshots: u64,
    pub subscribed: bool,
}

impl<T> SyncView<T> {
    fn new(buffer: T) -> Self {
        Self {
            phase: Phase::Unattached,
            buffer,
            busy: false,
            in_flight: 0,
            error: None,
            snapshots: 0,
            subscribed: false,
        }
    }

    pub fn is_detached(&self) -> bool {
        self.phase == Phase::Detached
    }

    /// Whether the save affordance should be enabled
    pub fn can_save(&self) -> bool {
        !self.busy && !self.is_detached()
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(WidgetError::user_message)
    }

    pub fn can_retry(&self) -> bool {
        self.error.as_ref().is_some_and(WidgetError::is_retryable)
    }

    /// Phase once nothing is in flight
    fn settled_phase(&self) -> Phase {
        if self.error.is_some() {
            Phase::Errored
        } else if self.snapshots > 0 {
            Phase::Synced
        } else if self.subscribed {
            Phase::Attached
        } else {
            Phase::Unattached
        }
    }

    fn settle(&mut self) {
        if self.in_flight == 0 {
            self.phase = self.settled_phase();
        }
    }
}

#[derive(Default)]
struct Binding {
    unsubscriber: Option<Unsubscriber>,
    pump: Option<JoinHandle<()>>,
}

impl Binding {
    fn is_bound(&self) -> bool {
        self.unsubscriber.is_some()
    }

    fn release(&mut self) {
        if let Some(unsubscriber) = self.unsubscriber.take() {
            unsubscriber.unsubscribe();
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

/// Local mirror of one remote document
///
/// Every mutation of the view goes through the `watch` sender and is refused
/// once the phase is [`Phase::Detached`].
pub(crate) struct Mirror<T> {
    view: watch::Sender<SyncView<T>>,
    /// Remote value that arrived while an exclusive write was in flight
    held: Mutex<Option<T>>,
    binding: Mutex<Binding>,
}

impl<T> Mirror<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(initial: T) -> Arc<Self> {
        let (view, _rx) = watch::channel(SyncView::new(initial));
        Arc::new(Self {
            view,
            held: Mutex::new(None),
            binding: Mutex::new(Binding::default()),
        })
    }

    fn lock_binding(&self) -> MutexGuard<'_, Binding> {
        self.binding.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_held(&self) -> MutexGuard<'_, Option<T>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn view(&self) -> SyncView<T> {
        self.view.borrow().clone()
    }

    pub(crate) fn buffer(&self) -> T {
        self.view.borrow().buffer.clone()
    }

    pub(crate) fn watch(&self) -> watch::Receiver<SyncView<T>> {
        self.view.subscribe()
    }

    pub(crate) fn is_detached(&self) -> bool {
        self.view.borrow().is_detached()
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.lock_binding().is_bound()
    }

    /// Mutate the view unless detached; returns whether anything was applied
    pub(crate) fn update(&self, f: impl FnOnce(&mut SyncView<T>)) -> bool {
        self.view.send_if_modified(|view| {
            if view.is_detached() {
                return false;
            }
            f(view);
            true
        })
    }

    /// Start draining `subscription` into the view through `apply`
    pub(crate) fn bind<F>(self: &Arc<Self>, mut subscription: Subscription, apply: F)
    where
        F: Fn(&Self, SnapshotEvent) + Send + 'static,
    {
        let unsubscriber = subscription.unsubscriber();
        let weak = Arc::downgrade(self);
        let pump = tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                let Some(mirror) = weak.upgrade() else { break };
                if mirror.is_detached() {
                    break;
                }
                apply(&mirror, event);
            }
        });

        let mut binding = self.lock_binding();
        binding.release();
        binding.unsubscriber = Some(unsubscriber);
        binding.pump = Some(pump);
        drop(binding);

        self.update(|view| {
            view.subscribed = true;
            view.settle();
        });
    }

    /// Freeze the view and release the subscription. Returns false if already detached.
    pub(crate) fn detach(&self) -> bool {
        let detached = self.view.send_if_modified(|view| {
            if view.is_detached() {
                return false;
            }
            view.phase = Phase::Detached;
            view.subscribed = false;
            true
        });
        self.lock_binding().release();
        self.lock_held().take();
        detached
    }

    /// Apply a remote value
    ///
    /// `None` (document absent) leaves the buffer alone. With `hold_while_busy`
    /// a value arriving during an exclusive write is held for [`Self::end_op`].
    pub(crate) fn apply_remote(&self, value: Option<T>, hold_while_busy: bool) {
        self.update(|view| {
            if let Some(value) = value {
                if hold_while_busy && view.busy {
                    *self.lock_held() = Some(value);
                } else {
                    view.buffer = value;
                }
            }
            view.snapshots += 1;
            if view.error.as_ref().is_some_and(WidgetError::is_load) {
                view.error = None;
            }
            view.settle();
        });
    }

    /// Record a subscription failure; the subscription stays open
    pub(crate) fn apply_load_error(&self, error: LoadError) {
        self.update(|view| {
            view.error = Some(WidgetError::Load(error));
            view.settle();
        });
    }

    /// Enter an operation; `exclusive` ones are refused while another is in flight
    ///
    /// `f` runs on the view at the moment the operation starts, which is where
    /// a write freezes its payload.
    pub(crate) fn begin_op<R>(
        &self,
        exclusive: bool,
        f: impl FnOnce(&mut SyncView<T>) -> R,
    ) -> Result<R, WidgetError> {
        let mut outcome = Err(WidgetError::Detached);
        self.view.send_if_modified(|view| {
            if view.is_detached() {
                return false;
            }
            if exclusive && view.busy {
                outcome = Err(WidgetError::Busy);
                return false;
            }
            if exclusive {
                view.busy = true;
            }
            view.in_flight += 1;
            view.phase = Phase::Saving;
            outcome = Ok(f(view));
            true
        });
        outcome
    }

    /// Leave an operation, recording its error (if any)
    ///
    /// `f` gets the view plus whatever remote value was held during the
    /// operation. Nothing is applied once detached.
    pub(crate) fn end_op(
        &self,
        exclusive: bool,
        error: Option<WidgetError>,
        f: impl FnOnce(&mut SyncView<T>, &mut Option<T>),
    ) {
        self.update(|view| {
            if exclusive {
                view.busy = false;
            }
            view.in_flight = view.in_flight.saturating_sub(1);
            f(view, &mut self.lock_held());
            match error {
                Some(error) => view.error = Some(error),
                None if view.error.as_ref().is_some_and(WidgetError::is_load) => {}
                None => view.error = None,
            }
            view.settle();
        });
    }

    /// Resolve once the view satisfies `pred`
    pub(crate) async fn wait_for(&self, mut pred: impl FnMut(&SyncView<T>) -> bool) -> SyncView<T> {
        let mut rx = self.view.subscribe();
        let result = rx.wait_for(|view| pred(view)).await.map(|view| view.clone());
        result.unwrap_or_else(|_| self.view())
    }
}

impl<T> Drop for Mirror<T> {
    fn drop(&mut self) {
        self.binding
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .release();
    }
}
