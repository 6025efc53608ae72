//! Tween manager
//!
//! Owns the set of registered tweens and advances the active ones once per
//! tick. Registration and removal requested while a tick is running are
//! staged in `pending_add` / `pending_remove` and applied at the start of the
//! next tick, so callbacks may freely create, kill or replay tweens.
//!
//! A registered tween is in one of two places:
//! - **active**: advanced every tick
//! - **parked**: paused, or completed without autokill. Still registered
//!   (lookup, stats, bulk operations) but not advanced until played again.
//!
//! ```ignore
//! let manager = TweenManager::new(Rc::new(SystemClock::new()));
//! let fade = manager.tween_to(0.0_f32, 0.3);
//! fade.on_update(move |v| set_opacity(*v))?;
//! fade.play();
//!
//! // every frame
//! manager.update();
//! ```

use crate::callbacks::{CallbackId, CallbackKind};
use crate::clock::Clock;
use crate::config::TweenConfig;
use crate::error::{Result, TweenError};
use crate::pool::{PoolStats, TweenPool};
use crate::task::{TweenCell, TweenHandle, TweenTask};
use crate::tween::{Tween, TweenId};
use crate::values::TweenValue;
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use std::cell::RefCell;
use std::hash::BuildHasherDefault;
use std::mem;
use std::rc::{Rc, Weak};

type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;
type TaskRef = Rc<dyn TweenTask>;

/// Counts across all registered tweens
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TweenStats {
    /// Tweens advanced on the next tick (excluding pending)
    pub active: usize,
    /// Registered, waiting for the next tick to become active
    pub pending: usize,
    pub paused: usize,
    /// Completed but not killed
    pub completed: usize,
    pub looping: usize,
    pub registered: usize,
}

/// Internal state of the manager
struct ManagerState {
    /// Tweens advanced each tick, in registration order
    active: FxIndexMap<TweenId, TaskRef>,
    /// Every registered tween (active, pending or parked)
    registered: FxIndexMap<TweenId, TaskRef>,
    by_short_id: FxHashMap<String, TweenId>,
    pending_add: Vec<(TweenId, TaskRef)>,
    /// Registered ids currently staged in `pending_add`
    pending_ids: FxHashSet<TweenId>,
    pending_remove: Vec<TweenId>,
    /// Reusable snapshot of `active` iterated during a tick
    cache: Vec<(TweenId, TaskRef)>,
    cache_dirty: bool,
    iterating: bool,
    cache_headroom: f32,
}

impl ManagerState {
    fn new(config: &TweenConfig) -> Self {
        let capacity = config.manager.initial_capacity;
        Self {
            active: FxIndexMap::with_capacity_and_hasher(capacity, Default::default()),
            registered: FxIndexMap::with_capacity_and_hasher(capacity, Default::default()),
            by_short_id: FxHashMap::default(),
            pending_add: Vec::with_capacity(capacity),
            pending_ids: FxHashSet::default(),
            pending_remove: Vec::new(),
            cache: Vec::with_capacity(capacity),
            cache_dirty: true,
            iterating: false,
            cache_headroom: config.manager.cache_headroom.max(1.0),
        }
    }

    /// Apply staged removals, then staged additions
    fn apply_pending(&mut self) {
        if self.pending_remove.is_empty() && self.pending_add.is_empty() {
            return;
        }
        self.apply_removals();
        self.pending_ids.clear();
        for (id, task) in self.pending_add.drain(..) {
            // Skip entries unregistered (or recycled under a new id) since staging
            if self.registered.contains_key(&id) && !self.active.contains_key(&id) {
                self.active.insert(id, task);
            }
        }
        self.cache_dirty = true;
    }

    fn apply_removals(&mut self) {
        if self.pending_remove.is_empty() {
            return;
        }
        for id in self.pending_remove.drain(..) {
            self.active.shift_remove(&id);
        }
        self.cache_dirty = true;
    }

    fn rebuild_cache(&mut self) {
        self.cache.clear();
        let wanted = self.active.len();
        if self.cache.capacity() < wanted {
            let target = (wanted as f32 * self.cache_headroom).ceil() as usize;
            self.cache.reserve(target);
        }
        self.cache
            .extend(self.active.iter().map(|(id, task)| (*id, Rc::clone(task))));
        self.cache_dirty = false;
    }

    fn stage(&mut self, id: TweenId, task: TaskRef) {
        if self.pending_ids.insert(id) {
            self.pending_add.push((id, task));
        }
    }

    /// Drop the short-id entry if it still points at `id`
    fn forget_short_id(&mut self, id: TweenId, short_id: &str) {
        if self.by_short_id.get(short_id) == Some(&id) {
            self.by_short_id.remove(short_id);
        }
    }

    /// Drop `id` from the lookup maps; unlink from `active` now or at the
    /// next tick
    fn unregister(&mut self, id: TweenId) -> Option<TaskRef> {
        let task = self.registered.shift_remove(&id)?;
        self.forget_short_id(id, &task.short_id());
        self.pending_ids.remove(&id);
        if self.iterating {
            self.pending_remove.push(id);
        } else {
            self.active.shift_remove(&id);
            self.pending_add.retain(|(pending, _)| *pending != id);
            self.cache_dirty = true;
        }
        Some(task)
    }
}

struct Shared {
    clock: Rc<dyn Clock>,
    config: TweenConfig,
    state: RefCell<ManagerState>,
    pool: RefCell<TweenPool>,
}

/// The tween scheduler
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct TweenManager {
    shared: Rc<Shared>,
}

impl TweenManager {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self::with_config(clock, TweenConfig::default())
    }

    pub fn with_config(clock: Rc<dyn Clock>, config: TweenConfig) -> Self {
        let pool = TweenPool::new(Rc::clone(&clock), config.pool.clone(), config.defaults);
        let state = ManagerState::new(&config);
        tracing::debug!(
            "TweenManager created (pool enabled: {}, preload: {})",
            config.pool.enabled,
            config.pool.preload
        );
        Self {
            shared: Rc::new(Shared {
                clock,
                config,
                state: RefCell::new(state),
                pool: RefCell::new(pool),
            }),
        }
    }

    /// Weak handle for tweens to report back through
    pub fn handle(&self) -> ManagerHandle {
        ManagerHandle {
            inner: Rc::downgrade(&self.shared),
        }
    }

    pub fn clock(&self) -> Rc<dyn Clock> {
        Rc::clone(&self.shared.clock)
    }

    pub fn config(&self) -> &TweenConfig {
        &self.shared.config
    }

    pub fn now(&self) -> f64 {
        self.shared.clock.now()
    }

    // =========================================================================
    // Tick
    // =========================================================================

    /// Advance every active tween using the clock's current time
    pub fn update(&self) {
        let now = self.shared.clock.now();
        self.update_at(now);
    }

    /// Advance every active tween to `now`
    ///
    /// Tweens registered during this pass are first advanced on the next one.
    pub fn update_at(&self, now: f64) {
        let cache = {
            let Ok(mut state) = self.shared.state.try_borrow_mut() else {
                tracing::warn!("TweenManager::update re-entered, ignoring");
                return;
            };
            if state.iterating {
                tracing::warn!("TweenManager::update re-entered from a callback, ignoring");
                return;
            }
            state.apply_pending();
            if state.cache_dirty {
                state.rebuild_cache();
            }
            state.iterating = true;
            mem::take(&mut state.cache)
        };

        for (id, task) in &cache {
            // Unregistered (or recycled) by an earlier callback this tick
            if !self.shared.state.borrow().registered.contains_key(id) {
                continue;
            }
            if task.update(now) {
                continue;
            }
            self.retire(*id, task);
        }

        let mut state = self.shared.state.borrow_mut();
        state.cache = cache;
        state.iterating = false;
        // Removals are safe again; additions wait for the next tick
        state.apply_removals();
    }

    /// Unlink a tween whose update returned false
    fn retire(&self, id: TweenId, task: &TaskRef) {
        let killed = task.status().killed;
        {
            let mut state = self.shared.state.borrow_mut();
            state.active.shift_remove(&id);
            state.cache_dirty = true;
            if killed {
                state.registered.shift_remove(&id);
                state.forget_short_id(id, &task.short_id());
            }
        }
        if killed {
            tracing::trace!("Tween {} finished", id);
            self.release(Rc::clone(task));
        } else {
            tracing::trace!("Tween {} parked", id);
        }
    }

    /// Detach a killed tween and recycle it when pooling applies
    fn release(&self, task: TaskRef) {
        task.set_manager(None);
        if task.is_pooled() && self.shared.clock.is_live() && self.shared.config.pool.enabled {
            task.recycle(&mut self.shared.pool.borrow_mut());
        }
    }

    /// React to a state change on a registered task: release it once
    /// killed, re-stage it once playing again
    pub(crate) fn reconcile(&self, id: TweenId) {
        let task = self.shared.state.borrow().registered.get(&id).cloned();
        let Some(task) = task else {
            return;
        };
        let status = task.status();
        if status.killed {
            if self.unregister(id) {
                self.release(task);
            }
            return;
        }
        if status.playing {
            let mut state = self.shared.state.borrow_mut();
            if !state.active.contains_key(&id) && !state.pending_ids.contains(&id) {
                tracing::trace!("Tween {} woken", id);
                state.stage(id, task);
            }
        }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register a tween; it becomes active on the next tick
    pub fn register<T: TweenValue>(&self, handle: &TweenHandle<T>) {
        self.register_task(handle.task());
    }

    pub fn register_task(&self, task: TaskRef) {
        let id = task.id();
        let short_id = task.short_id();
        task.set_manager(Some(self.handle()));

        let mut state = self.shared.state.borrow_mut();
        if state.registered.contains_key(&id) {
            tracing::trace!("Tween {} already registered", id);
            return;
        }
        if let Some(previous) = state.by_short_id.insert(short_id.clone(), id) {
            tracing::warn!(
                "Short id '{}' moved from tween {} to tween {}",
                short_id,
                previous,
                id
            );
        }
        state.registered.insert(id, Rc::clone(&task));
        state.stage(id, task);
        tracing::debug!("Registered tween {} ('{}')", id, short_id);
    }

    /// Remove a tween from the manager without killing it
    ///
    /// Returns false if it was not registered.
    pub fn unregister(&self, id: TweenId) -> bool {
        let task = self.shared.state.borrow_mut().unregister(id);
        match task {
            Some(task) => {
                task.set_manager(None);
                tracing::debug!("Unregistered tween {}", id);
                true
            }
            None => false,
        }
    }

    pub(crate) fn reindex_short_id(&self, id: TweenId, previous: &str, short_id: &str) {
        let mut state = self.shared.state.borrow_mut();
        if !state.registered.contains_key(&id) {
            return;
        }
        if state.by_short_id.get(previous) == Some(&id) {
            state.by_short_id.remove(previous);
        }
        if let Some(other) = state.by_short_id.insert(short_id.to_string(), id) {
            if other != id {
                tracing::warn!("Short id '{}' moved from tween {} to tween {}", short_id, other, id);
            }
        }
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Take a tween from the pool and register it
    ///
    /// With pooling disabled, or on a preview clock, a fresh instance is
    /// built instead. Returns `None` if the pool is exhausted.
    pub fn create_tween<T: TweenValue>(&self) -> Option<TweenHandle<T>> {
        let handle = self.dispense::<T>()?;
        self.register(&handle);
        Some(handle)
    }

    /// Like [`create_tween`](Self::create_tween) but reports exhaustion as an
    /// error
    pub fn try_create_tween<T: TweenValue>(&self) -> Result<TweenHandle<T>> {
        self.create_tween::<T>().ok_or(TweenError::PoolExhausted {
            type_name: std::any::type_name::<T>(),
        })
    }

    /// Register an already configured tween (never pooled)
    pub fn add<T: TweenValue>(&self, tween: Tween<T>) -> TweenHandle<T> {
        let handle = TweenHandle::new(tween);
        self.register(&handle);
        handle
    }

    /// A registered tween from the rest value to `end`, not yet playing
    ///
    /// Falls back to a fresh instance when the pool is exhausted.
    pub fn tween_to<T: TweenValue>(&self, end: T, duration: f64) -> TweenHandle<T> {
        let handle = self.dispense::<T>().unwrap_or_else(|| {
            TweenHandle::new(Tween::with_defaults(self.clock(), self.shared.config.defaults))
        });
        if let Err(err) = handle.with_mut(|tween| {
            tween.initialize(end, duration);
        }) {
            tracing::warn!("Could not initialize tween {}: {}", handle.id(), err);
        }
        self.register(&handle);
        handle
    }

    /// Like [`tween_to`](Self::tween_to) with an explicit start value
    pub fn tween_from_to<T: TweenValue>(&self, start: T, end: T, duration: f64) -> TweenHandle<T> {
        let handle = self.tween_to(end, duration);
        if let Err(err) = handle.with_mut(|tween| {
            tween.set_from(start);
        }) {
            tracing::warn!("Could not set start value of tween {}: {}", handle.id(), err);
        }
        handle
    }

    fn dispense<T: TweenValue>(&self) -> Option<TweenHandle<T>> {
        if self.shared.config.pool.enabled && self.shared.clock.is_live() {
            self.shared.pool.borrow_mut().take::<T>()
        } else {
            Some(TweenHandle::new(Tween::with_defaults(
                self.clock(),
                self.shared.config.defaults,
            )))
        }
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub fn contains(&self, id: TweenId) -> bool {
        self.shared.state.borrow().registered.contains_key(&id)
    }

    pub fn task(&self, id: TweenId) -> Option<TaskRef> {
        let task = self.shared.state.borrow().registered.get(&id).cloned();
        if task.is_none() {
            tracing::debug!("No tween registered with id {}", id);
        }
        task
    }

    pub fn task_by_short_id(&self, short_id: &str) -> Option<TaskRef> {
        let state = self.shared.state.borrow();
        let task = state
            .by_short_id
            .get(short_id)
            .and_then(|id| state.registered.get(id))
            .cloned();
        if task.is_none() {
            tracing::debug!("No tween registered with short id '{}'", short_id);
        }
        task
    }

    /// Typed handle to a registered tween
    pub fn get<T: TweenValue>(&self, id: TweenId) -> Result<TweenHandle<T>> {
        let task = self.task(id).ok_or(TweenError::NotFound(id))?;
        downcast::<T>(task)
    }

    pub fn get_by_short_id<T: TweenValue>(&self, short_id: &str) -> Result<TweenHandle<T>> {
        let task = self
            .task_by_short_id(short_id)
            .ok_or_else(|| TweenError::ShortIdNotFound(short_id.to_string()))?;
        downcast::<T>(task)
    }

    /// Subscribe a typed update callback on a registered tween
    ///
    /// Rejected (and logged) if the tween animates a different value type.
    pub fn on_update<T: TweenValue>(
        &self,
        id: TweenId,
        f: impl FnMut(&T) + 'static,
    ) -> Result<CallbackId> {
        self.get::<T>(id)?.on_update(f)
    }

    /// Subscribe a typed step-update callback on a registered tween
    pub fn on_step_update<T: TweenValue>(
        &self,
        id: TweenId,
        f: impl FnMut(&T) + 'static,
    ) -> Result<CallbackId> {
        self.get::<T>(id)?
            .with_mut(|tween| tween.on_step_update(f))
    }

    /// Subscribe a lifecycle callback on a registered tween of any type
    pub fn on_lifecycle(
        &self,
        id: TweenId,
        kind: CallbackKind,
        f: impl FnMut(TweenId) + 'static,
    ) -> Result<CallbackId> {
        self.task(id)
            .ok_or(TweenError::NotFound(id))?
            .subscribe(kind, Box::new(f))
    }

    pub fn remove_callback(&self, id: TweenId, kind: CallbackKind, callback: CallbackId) -> bool {
        self.task(id)
            .map(|task| task.unsubscribe(kind, callback))
            .unwrap_or(false)
    }

    /// Rename a registered tween
    pub fn rename(&self, id: TweenId, short_id: impl Into<String>) -> bool {
        let Some(task) = self.task(id) else {
            return false;
        };
        task.rename(short_id.into());
        true
    }

    // =========================================================================
    // Control by id
    // =========================================================================

    pub fn play(&self, id: TweenId) -> bool {
        self.control(id, |task| task.play())
    }

    pub fn pause(&self, id: TweenId) -> bool {
        self.control(id, |task| task.pause())
    }

    pub fn resume(&self, id: TweenId) -> bool {
        self.control(id, |task| task.resume())
    }

    pub fn rewind(&self, id: TweenId, and_kill: bool) -> bool {
        self.control(id, |task| task.rewind(and_kill))
    }

    pub fn kill(&self, id: TweenId, complete: bool) -> bool {
        self.control(id, |task| task.kill(complete))
    }

    pub fn set_progress(&self, id: TweenId, progress: f32) -> bool {
        self.control(id, |task| task.set_progress(progress))
    }

    /// The task reconciles itself with the manager after `op`
    fn control(&self, id: TweenId, op: impl FnOnce(&dyn TweenTask)) -> bool {
        let Some(task) = self.task(id) else {
            return false;
        };
        op(task.as_ref());
        true
    }

    // =========================================================================
    // Bulk operations
    // =========================================================================

    /// Kill every playing tween; returns how many were killed
    pub fn kill_all_playing(&self) -> usize {
        self.for_each_matching(|task| task.status().playing, |task| task.kill(false))
    }

    /// Kill every paused tween
    pub fn kill_all_paused(&self) -> usize {
        self.for_each_matching(|task| task.status().paused, |task| task.kill(false))
    }

    /// Kill every registered tween, optionally completing it first
    pub fn kill_all(&self, complete: bool) -> usize {
        self.for_each_matching(|task| !task.status().killed, |task| task.kill(complete))
    }

    /// Play every tween that is not already playing
    pub fn play_all(&self) -> usize {
        self.for_each_matching(|task| !task.status().playing, |task| task.play())
    }

    pub fn pause_all(&self) -> usize {
        self.for_each_matching(|task| task.status().playing, |task| task.pause())
    }

    /// Rewind every tween, leaving it idle
    pub fn rewind_all(&self) -> usize {
        self.for_each_matching(|_| true, |task| task.rewind(false))
    }

    fn for_each_matching(
        &self,
        filter: impl Fn(&dyn TweenTask) -> bool,
        mut op: impl FnMut(&dyn TweenTask),
    ) -> usize {
        let snapshot = self.registered_snapshot();
        let mut count = 0;
        for task in snapshot {
            // An earlier op in this pass may have killed or recycled it
            if !self.contains(task.id()) || !filter(task.as_ref()) {
                continue;
            }
            op(task.as_ref());
            count += 1;
        }
        count
    }

    // =========================================================================
    // Pool
    // =========================================================================

    pub fn preload<T: TweenValue>(&self, count: usize) {
        self.shared.pool.borrow_mut().preload::<T>(count);
    }

    pub fn set_expand_count<T: TweenValue>(&self, count: usize) {
        self.shared.pool.borrow_mut().set_expand_count::<T>(count);
    }

    /// Return a killed pooled tween to its free-list
    ///
    /// Unregisters it first. No-op for tweens that are not pooled or already
    /// recycled.
    pub fn recycle(&self, task: TaskRef) -> bool {
        self.unregister(task.id());
        task.recycle(&mut self.shared.pool.borrow_mut())
    }

    /// Kill and recycle every registered tween
    ///
    /// With `skip_playing`, tweens that are still playing are left alone.
    /// `on_each` sees each id before it is killed.
    pub fn force_recycle_all(&self, skip_playing: bool, mut on_each: impl FnMut(TweenId)) -> usize {
        let snapshot = self.registered_snapshot();
        let mut count = 0;
        for task in snapshot {
            let id = task.id();
            if !self.contains(id) || (skip_playing && task.status().playing) {
                continue;
            }
            on_each(id);
            task.kill(false);
            self.unregister(id);
            task.set_manager(None);
            if task.is_pooled() {
                task.recycle(&mut self.shared.pool.borrow_mut());
            }
            count += 1;
        }
        count
    }

    /// World/scene teardown: flush every tween, even mid-playback
    pub fn on_world_unload(&self) -> usize {
        let count = self.force_recycle_all(false, |_| {});
        let mut state = self.shared.state.borrow_mut();
        state.pending_add.clear();
        state.pending_ids.clear();
        if !state.iterating {
            state.pending_remove.clear();
            state.active.clear();
        }
        state.cache_dirty = true;
        tracing::debug!("World unload flushed {} tweens", count);
        count
    }

    pub fn pool_stats(&self) -> Vec<PoolStats> {
        self.shared.pool.borrow().stats()
    }

    pub fn pool_stats_for<T: TweenValue>(&self) -> Option<PoolStats> {
        self.shared.pool.borrow().stats_for::<T>()
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    pub fn stats(&self) -> TweenStats {
        let state = self.shared.state.borrow();
        let mut stats = TweenStats {
            active: state.active.len(),
            pending: state.pending_ids.len(),
            registered: state.registered.len(),
            ..TweenStats::default()
        };
        for task in state.registered.values() {
            let status = task.status();
            if status.paused {
                stats.paused += 1;
            }
            if status.completed && !status.killed {
                stats.completed += 1;
            }
            if status.looping {
                stats.looping += 1;
            }
        }
        stats
    }

    pub fn active_count(&self) -> usize {
        self.shared.state.borrow().active.len()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.state.borrow().pending_ids.len()
    }

    pub fn registered_count(&self) -> usize {
        self.shared.state.borrow().registered.len()
    }

    /// Whether anything will be advanced on the next tick
    pub fn has_active_tweens(&self) -> bool {
        let state = self.shared.state.borrow();
        !state.active.is_empty() || !state.pending_ids.is_empty()
    }

    /// Snapshot of the active tweens, in tick order
    pub fn active_tweens(&self) -> Vec<TaskRef> {
        self.shared.state.borrow().active.values().cloned().collect()
    }

    pub fn active_ids(&self) -> Vec<TweenId> {
        self.shared.state.borrow().active.keys().copied().collect()
    }

    fn registered_snapshot(&self) -> Vec<TaskRef> {
        self.shared.state.borrow().registered.values().cloned().collect()
    }
}

fn downcast<T: TweenValue>(task: TaskRef) -> Result<TweenHandle<T>> {
    let id = task.id();
    let actual = task.value_type_name();
    match task.as_any().downcast::<TweenCell<T>>() {
        Ok(cell) => Ok(TweenHandle::from_cell(cell)),
        Err(_) => {
            let expected = std::any::type_name::<T>();
            tracing::error!(
                "Tween {} animates {}, rejected access as {}",
                id,
                actual,
                expected
            );
            Err(TweenError::TypeMismatch {
                id,
                expected,
                actual,
            })
        }
    }
}

impl std::fmt::Debug for TweenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TweenManager")
            .field("stats", &self.stats())
            .finish()
    }
}

/// A weak handle to the tween manager
///
/// Held by registered tweens so handle calls can be reconciled with the
/// manager. It won't keep the manager alive.
#[derive(Clone)]
pub struct ManagerHandle {
    inner: Weak<Shared>,
}

impl ManagerHandle {
    pub fn upgrade(&self) -> Option<TweenManager> {
        self.inner.upgrade().map(|shared| TweenManager { shared })
    }

    /// Check if the manager is still alive
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl std::fmt::Debug for ManagerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerHandle")
            .field("alive", &self.is_alive())
            .finish()
    }
}
