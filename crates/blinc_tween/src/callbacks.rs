//! Multi-subscriber callback slots
//!
//! Each callback category on a tween is a [`CallbackList`]. Subscribing
//! returns a [`CallbackId`]; unsubscribing removes exactly that subscriber
//! regardless of registration order.

use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Handle to a subscribed callback
    pub struct CallbackId;
}

/// The callback categories a tween exposes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    Start,
    Stop,
    Complete,
    Kill,
    Pause,
    Resume,
    Rewind,
    DelayUpdate,
    Update,
    StepUpdate,
    Progress,
    EasedProgress,
}

/// An observer list for one callback category
///
/// `F` is the unsized closure type, e.g. `dyn FnMut(&T)`.
pub struct CallbackList<F: ?Sized> {
    subscribers: SlotMap<CallbackId, Box<F>>,
}

impl<F: ?Sized> CallbackList<F> {
    pub fn new() -> Self {
        Self {
            subscribers: SlotMap::with_key(),
        }
    }

    pub fn add(&mut self, callback: Box<F>) -> CallbackId {
        self.subscribers.insert(callback)
    }

    /// Remove one subscriber; returns false if it was not subscribed
    pub fn remove(&mut self, id: CallbackId) -> bool {
        self.subscribers.remove(id).is_some()
    }

    pub fn clear(&mut self) {
        self.subscribers.clear();
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Invoke every subscriber through `call`
    pub(crate) fn fire_with(&mut self, mut call: impl FnMut(&mut F)) {
        for (_, callback) in self.subscribers.iter_mut() {
            call(callback);
        }
    }
}

impl<F: ?Sized> Default for CallbackList<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> std::fmt::Debug for CallbackList<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackList")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
