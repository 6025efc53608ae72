//! Shared tween handles and the type-erased task interface
//!
//! A [`Tween`] lives inside a [`TweenCell`], shared through `Rc` between the
//! caller's [`TweenHandle`] and the manager's active collection. The manager
//! only sees `Rc<dyn TweenTask>`, which hides the value type.
//!
//! Control calls that arrive while the tween is busy firing its own
//! callbacks (for example `handle.play()` from inside `on_complete`) cannot
//! borrow it. They are queued and applied as soon as the running operation
//! returns.

use crate::callbacks::{CallbackId, CallbackKind};
use crate::error::{Result, TweenError};
use crate::manager::{ManagerHandle, TweenManager};
use crate::pool::TweenPool;
use crate::tween::{Tween, TweenId};
use crate::values::TweenValue;
use smallvec::SmallVec;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::Rc;

/// Snapshot of a task's lifecycle flags
///
/// Refreshed after every operation so it can be read while the tween itself
/// is borrowed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TaskStatus {
    pub started: bool,
    pub playing: bool,
    pub paused: bool,
    pub completed: bool,
    pub killed: bool,
    pub looping: bool,
    pub recycled: bool,
}

impl TaskStatus {
    fn of<T: TweenValue>(tween: &Tween<T>) -> Self {
        Self {
            started: tween.is_started(),
            playing: tween.is_playing(),
            paused: tween.is_paused(),
            completed: tween.is_completed(),
            killed: tween.is_killed(),
            looping: tween.is_looping(),
            recycled: tween.is_recycled(),
        }
    }
}

/// A control operation waiting for the tween to become free
#[derive(Debug)]
enum Deferred {
    Play,
    Pause,
    Resume,
    Rewind { and_kill: bool },
    Kill { complete: bool },
    SetProgress(f32),
    Rename(String),
}

impl Deferred {
    fn apply<T: TweenValue>(self, tween: &mut Tween<T>) {
        match self {
            Deferred::Play => {
                tween.play();
            }
            Deferred::Pause => {
                tween.pause();
            }
            Deferred::Resume => {
                tween.resume();
            }
            Deferred::Rewind { and_kill } => {
                tween.rewind(and_kill);
            }
            Deferred::Kill { complete } => {
                tween.kill(complete);
            }
            Deferred::SetProgress(progress) => {
                tween.set_progress(progress);
            }
            Deferred::Rename(short_id) => {
                tween.set_short_id(short_id);
            }
        }
    }
}

/// Type-erased view of a tween, as stored by the manager
pub trait TweenTask {
    fn id(&self) -> TweenId;

    fn short_id(&self) -> String;

    /// `std::any::type_name` of the animated value
    fn value_type_name(&self) -> &'static str;

    fn status(&self) -> TaskStatus;

    /// Advance one tick; `false` means "leave the active set"
    fn update(&self, now: f64) -> bool;

    fn play(&self);

    fn pause(&self);

    fn resume(&self);

    fn rewind(&self, and_kill: bool);

    fn kill(&self, complete: bool);

    fn set_progress(&self, progress: f32);

    fn rename(&self, short_id: String);

    /// Subscribe a lifecycle callback without knowing the value type
    fn subscribe(&self, kind: CallbackKind, f: Box<dyn FnMut(TweenId)>) -> Result<CallbackId>;

    fn unsubscribe(&self, kind: CallbackKind, id: CallbackId) -> bool;

    /// Whether this instance came from (and returns to) the pool
    fn is_pooled(&self) -> bool;

    fn manager(&self) -> Option<ManagerHandle>;

    fn set_manager(&self, manager: Option<ManagerHandle>);

    /// Reset and hand the instance back to its free-list
    ///
    /// Returns false if the instance is not pooled, already recycled, or
    /// currently busy.
    fn recycle(self: Rc<Self>, pool: &mut TweenPool) -> bool;

    fn as_any(self: Rc<Self>) -> Rc<dyn Any>;
}

/// Shared storage for one tween
pub struct TweenCell<T: TweenValue> {
    tween: RefCell<Tween<T>>,
    id: Cell<TweenId>,
    short_id: RefCell<String>,
    status: Cell<TaskStatus>,
    deferred: RefCell<SmallVec<[Deferred; 2]>>,
    manager: RefCell<Option<ManagerHandle>>,
    pooled: bool,
}

impl<T: TweenValue> TweenCell<T> {
    pub(crate) fn new(tween: Tween<T>, pooled: bool) -> Self {
        let id = tween.id();
        let short_id = tween.short_id().to_string();
        let status = TaskStatus::of(&tween);
        Self {
            tween: RefCell::new(tween),
            id: Cell::new(id),
            short_id: RefCell::new(short_id),
            status: Cell::new(status),
            deferred: RefCell::new(SmallVec::new()),
            manager: RefCell::new(None),
            pooled,
        }
    }

    /// Apply `op` now, or queue it if the tween is mid-callback
    ///
    /// An applied op is reported to the owning manager, so a task killed or
    /// replayed through any path is released or re-staged.
    fn control(&self, op: Deferred) {
        match self.tween.try_borrow_mut() {
            Ok(mut tween) => op.apply(&mut tween),
            Err(_) => {
                tracing::trace!("Tween {}: deferring {:?}", self.id.get(), op);
                self.deferred.borrow_mut().push(op);
                return;
            }
        }
        self.settle();
        self.reconcile();
    }

    fn owner(&self) -> Option<TweenManager> {
        self.manager.borrow().as_ref().and_then(|handle| handle.upgrade())
    }

    fn reconcile(&self) {
        if let Some(manager) = self.owner() {
            manager.reconcile(self.id.get());
        }
    }

    /// Drain queued operations, then refresh the status snapshot
    fn settle(&self) {
        loop {
            let Ok(mut tween) = self.tween.try_borrow_mut() else {
                return;
            };
            let next = {
                let mut queue = self.deferred.borrow_mut();
                if queue.is_empty() {
                    None
                } else {
                    Some(queue.remove(0))
                }
            };
            match next {
                Some(op) => op.apply(&mut tween),
                None => {
                    self.status.set(TaskStatus::of(&tween));
                    return;
                }
            }
        }
    }

    /// Re-read id and short id after a reset
    fn sync_identity(&self, tween: &Tween<T>) {
        self.id.set(tween.id());
        *self.short_id.borrow_mut() = tween.short_id().to_string();
    }

    pub(crate) fn reset_for_dispense(&self) {
        if let Ok(mut tween) = self.tween.try_borrow_mut() {
            tween.reset_state();
            tween.set_recycled(false);
            self.sync_identity(&tween);
            self.status.set(TaskStatus::of(&tween));
        }
    }
}

impl<T: TweenValue> TweenTask for TweenCell<T> {
    fn id(&self) -> TweenId {
        self.id.get()
    }

    fn short_id(&self) -> String {
        self.short_id.borrow().clone()
    }

    fn value_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn status(&self) -> TaskStatus {
        self.status.get()
    }

    fn update(&self, now: f64) -> bool {
        match self.tween.try_borrow_mut() {
            Ok(mut tween) => {
                tween.update(now);
            }
            Err(_) => {
                tracing::warn!("Tween {}: update() re-entered from its own callback", self.id.get());
                return true;
            }
        }
        self.settle();
        // A replay queued from the complete callback keeps the task active
        let status = self.status.get();
        status.playing && !status.killed
    }

    fn play(&self) {
        self.control(Deferred::Play);
    }

    fn pause(&self) {
        self.control(Deferred::Pause);
    }

    fn resume(&self) {
        self.control(Deferred::Resume);
    }

    fn rewind(&self, and_kill: bool) {
        self.control(Deferred::Rewind { and_kill });
    }

    fn kill(&self, complete: bool) {
        self.control(Deferred::Kill { complete });
    }

    fn set_progress(&self, progress: f32) {
        self.control(Deferred::SetProgress(progress));
    }

    fn rename(&self, short_id: String) {
        let previous = mem::replace(&mut *self.short_id.borrow_mut(), short_id.clone());
        self.control(Deferred::Rename(short_id.clone()));
        if let Some(manager) = self.owner() {
            manager.reindex_short_id(self.id.get(), &previous, &short_id);
        }
    }

    fn subscribe(&self, kind: CallbackKind, f: Box<dyn FnMut(TweenId)>) -> Result<CallbackId> {
        let mut tween = self
            .tween
            .try_borrow_mut()
            .map_err(|_| TweenError::Busy(self.id.get()))?;
        tween
            .on_lifecycle(kind, f)
            .ok_or(TweenError::NotLifecycle(kind))
    }

    fn unsubscribe(&self, kind: CallbackKind, id: CallbackId) -> bool {
        match self.tween.try_borrow_mut() {
            Ok(mut tween) => tween.remove_callback(kind, id),
            Err(_) => false,
        }
    }

    fn is_pooled(&self) -> bool {
        self.pooled
    }

    fn manager(&self) -> Option<ManagerHandle> {
        self.manager.borrow().clone()
    }

    fn set_manager(&self, manager: Option<ManagerHandle>) {
        *self.manager.borrow_mut() = manager;
    }

    fn recycle(self: Rc<Self>, pool: &mut TweenPool) -> bool {
        if !self.pooled {
            return false;
        }
        {
            let Ok(mut tween) = self.tween.try_borrow_mut() else {
                tracing::warn!("Tween {}: cannot recycle while busy", self.id.get());
                return false;
            };
            if tween.is_recycled() {
                return false;
            }
            tracing::debug!("Recycling tween {}", tween.id());
            tween.reset_state();
            tween.set_recycled(true);
            self.sync_identity(&tween);
            self.status.set(TaskStatus::of(&tween));
        }
        self.deferred.borrow_mut().clear();
        self.set_manager(None);
        pool.give_back(self);
        true
    }

    fn as_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

/// Caller-side handle to a tween
///
/// Cheap to clone. A handle remembers which use of the instance it was
/// issued for; once a pooled instance is recycled, old handles go stale and
/// their calls become no-ops.
pub struct TweenHandle<T: TweenValue> {
    cell: Rc<TweenCell<T>>,
    id: TweenId,
}

impl<T: TweenValue> Clone for TweenHandle<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
            id: self.id,
        }
    }
}

impl<T: TweenValue> TweenHandle<T> {
    /// Wrap a freshly constructed tween (not pooled, not registered)
    pub fn new(tween: Tween<T>) -> Self {
        Self::from_cell(Rc::new(TweenCell::new(tween, false)))
    }

    pub(crate) fn from_cell(cell: Rc<TweenCell<T>>) -> Self {
        let id = cell.id.get();
        Self { cell, id }
    }

    /// The type-erased task behind this handle
    pub fn task(&self) -> Rc<dyn TweenTask> {
        self.cell.clone()
    }

    pub fn id(&self) -> TweenId {
        self.id
    }

    pub fn short_id(&self) -> String {
        self.cell.short_id()
    }

    /// Whether the instance has since been recycled
    pub fn is_stale(&self) -> bool {
        self.cell.id.get() != self.id
    }

    pub fn status(&self) -> TaskStatus {
        if self.is_stale() {
            return TaskStatus {
                killed: true,
                ..TaskStatus::default()
            };
        }
        self.cell.status()
    }

    pub fn is_playing(&self) -> bool {
        self.status().playing
    }

    pub fn is_paused(&self) -> bool {
        self.status().paused
    }

    pub fn is_completed(&self) -> bool {
        self.status().completed
    }

    pub fn is_killed(&self) -> bool {
        self.status().killed
    }

    pub fn is_pooled(&self) -> bool {
        self.cell.pooled
    }

    /// The manager this tween is registered with, if any
    pub fn manager(&self) -> Option<TweenManager> {
        self.cell.manager().and_then(|handle| handle.upgrade())
    }

    /// Read the tween; `None` while it is busy or if the handle is stale
    pub fn with<R>(&self, f: impl FnOnce(&Tween<T>) -> R) -> Option<R> {
        if self.is_stale() {
            return None;
        }
        self.cell.tween.try_borrow().ok().map(|tween| f(&tween))
    }

    /// Configure the tween
    ///
    /// Fails with [`TweenError::Busy`] when called from one of the tween's
    /// own callbacks; use the control methods there instead, which queue.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut Tween<T>) -> R) -> Result<R> {
        if self.is_stale() {
            return Err(TweenError::Stale(self.id));
        }
        let result = {
            let mut tween = self
                .cell
                .tween
                .try_borrow_mut()
                .map_err(|_| TweenError::Busy(self.id))?;
            f(&mut tween)
        };
        self.cell.settle();
        self.cell.reconcile();
        Ok(result)
    }

    pub fn value(&self) -> Option<T> {
        self.with(|tween| tween.value().clone())
    }

    pub fn progress(&self) -> Option<f32> {
        self.with(|tween| tween.progress())
    }

    pub fn play(&self) -> &Self {
        self.control(|task| task.play())
    }

    pub fn pause(&self) -> &Self {
        self.control(|task| task.pause())
    }

    pub fn resume(&self) -> &Self {
        self.control(|task| task.resume())
    }

    pub fn rewind(&self, and_kill: bool) -> &Self {
        self.control(|task| task.rewind(and_kill))
    }

    pub fn kill(&self, complete: bool) -> &Self {
        self.control(|task| task.kill(complete))
    }

    pub fn set_progress(&self, progress: f32) -> &Self {
        self.control(|task| task.set_progress(progress))
    }

    /// Replace the short id; a registered tween is re-indexed
    pub fn rename(&self, short_id: impl Into<String>) -> &Self {
        if self.is_stale() {
            tracing::warn!("Tween {}: rename on a stale handle ignored", self.id);
            return self;
        }
        self.cell.rename(short_id.into());
        self
    }

    /// Drive the tween directly, without a manager
    pub fn update(&self, now: f64) -> bool {
        if self.is_stale() {
            return false;
        }
        self.cell.update(now)
    }

    pub fn on_update(&self, f: impl FnMut(&T) + 'static) -> Result<CallbackId> {
        self.with_mut(|tween| tween.on_update(f))
    }

    pub fn on_complete(&self, f: impl FnMut(TweenId) + 'static) -> Result<CallbackId> {
        self.with_mut(|tween| tween.on_complete(f))
    }

    pub fn on_kill(&self, f: impl FnMut(TweenId) + 'static) -> Result<CallbackId> {
        self.with_mut(|tween| tween.on_kill(f))
    }

    fn control(&self, op: impl FnOnce(&TweenCell<T>)) -> &Self {
        if self.is_stale() {
            tracing::warn!("Tween {}: control call on a stale handle ignored", self.id);
            return self;
        }
        op(&self.cell);
        self
    }
}

impl<T: TweenValue> PartialEq for TweenHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell) && self.id == other.id
    }
}

impl<T: TweenValue> fmt::Debug for TweenHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TweenHandle")
            .field("id", &self.id)
            .field("short_id", &self.cell.short_id())
            .field("status", &self.status())
            .finish()
    }
}
