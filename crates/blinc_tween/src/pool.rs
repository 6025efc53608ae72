//! Per-value-type tween pool
//!
//! Each value type gets its own free-list of pre-built [`TweenCell`]s. Free
//! instances are always reset: no callbacks, not killed, flagged recycled.

use crate::clock::Clock;
use crate::config::{PoolConfig, TweenDefaults};
use crate::task::{TweenCell, TweenHandle};
use crate::tween::Tween;
use crate::values::TweenValue;
use rustc_hash::FxHashMap;
use std::any::{Any, TypeId};
use std::rc::Rc;

/// Diagnostics for one value type's free-list
#[derive(Clone, Debug, PartialEq)]
pub struct PoolStats {
    pub type_name: &'static str,
    /// Instances ever created by the pool for this type
    pub preloaded: usize,
    /// Instances currently handed out
    pub lent: usize,
    pub free: usize,
    /// `lent / preloaded`, in percent
    pub usage_percent: f32,
}

struct FreeList<T: TweenValue> {
    free: Vec<Rc<TweenCell<T>>>,
    preloaded: usize,
    lent: usize,
    expand_count: usize,
}

/// Object-safe view of a `FreeList<T>`
trait ErasedFreeList {
    fn stats(&self) -> PoolStats;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: TweenValue> ErasedFreeList for FreeList<T> {
    fn stats(&self) -> PoolStats {
        let usage_percent = if self.preloaded == 0 {
            0.0
        } else {
            self.lent as f32 / self.preloaded as f32 * 100.0
        };
        PoolStats {
            type_name: std::any::type_name::<T>(),
            preloaded: self.preloaded,
            lent: self.lent,
            free: self.free.len(),
            usage_percent,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Type-keyed free-lists of reusable tweens
pub struct TweenPool {
    config: PoolConfig,
    defaults: TweenDefaults,
    clock: Rc<dyn Clock>,
    lists: FxHashMap<TypeId, Box<dyn ErasedFreeList>>,
}

impl TweenPool {
    pub fn new(clock: Rc<dyn Clock>, config: PoolConfig, defaults: TweenDefaults) -> Self {
        Self {
            config,
            defaults,
            clock,
            lists: FxHashMap::default(),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Build exactly `count` more free instances of `T`
    ///
    /// An explicit preload replaces the default first-use batch.
    pub fn preload<T: TweenValue>(&mut self, count: usize) {
        let clock = Rc::clone(&self.clock);
        let defaults = self.defaults;
        let Some(list) = self.list_mut::<T>(0) else {
            return;
        };
        grow(list, &clock, defaults, count);
        tracing::debug!(
            "Preloaded {} tweens of {} ({} free)",
            count,
            std::any::type_name::<T>(),
            list.free.len()
        );
    }

    /// Per-type override of the expansion batch size
    pub fn set_expand_count<T: TweenValue>(&mut self, count: usize) {
        if let Some(list) = self.list_mut::<T>(0) {
            list.expand_count = count.max(1);
        }
    }

    /// Take a reset instance, expanding first if the free count is low
    ///
    /// Returns `None` (and logs) when nothing is free and expansion is off.
    pub fn take<T: TweenValue>(&mut self) -> Option<TweenHandle<T>> {
        let clock = Rc::clone(&self.clock);
        let defaults = self.defaults;
        let auto_expand = self.config.auto_expand;
        let low_water_mark = self.config.low_water_mark;
        let initial = self.config.preload;
        let list = self.list_mut::<T>(initial)?;

        if auto_expand && (list.free.is_empty() || list.free.len() < low_water_mark) {
            let batch = list.expand_count;
            grow(list, &clock, defaults, batch);
            tracing::debug!(
                "Expanded {} pool by {} ({} free)",
                std::any::type_name::<T>(),
                batch,
                list.free.len()
            );
        }

        let Some(cell) = list.free.pop() else {
            tracing::warn!(
                "Tween pool exhausted for {} ({} lent)",
                std::any::type_name::<T>(),
                list.lent
            );
            return None;
        };
        list.lent += 1;
        cell.reset_for_dispense();
        Some(TweenHandle::from_cell(cell))
    }

    /// Return a recycled instance to its free-list
    pub(crate) fn give_back<T: TweenValue>(&mut self, cell: Rc<TweenCell<T>>) {
        if let Some(list) = self.list_mut::<T>(0) {
            list.lent = list.lent.saturating_sub(1);
            list.free.push(cell);
        }
    }

    pub fn free_count<T: TweenValue>(&self) -> usize {
        self.list::<T>().map(|list| list.free.len()).unwrap_or(0)
    }

    pub fn lent_count<T: TweenValue>(&self) -> usize {
        self.list::<T>().map(|list| list.lent).unwrap_or(0)
    }

    pub fn stats(&self) -> Vec<PoolStats> {
        let mut stats: Vec<_> = self.lists.values().map(|list| list.stats()).collect();
        stats.sort_by(|a, b| a.type_name.cmp(b.type_name));
        stats
    }

    pub fn stats_for<T: TweenValue>(&self) -> Option<PoolStats> {
        self.lists.get(&TypeId::of::<T>()).map(|list| list.stats())
    }

    fn list<T: TweenValue>(&self) -> Option<&FreeList<T>> {
        self.lists
            .get(&TypeId::of::<T>())
            .and_then(|list| list.as_any().downcast_ref::<FreeList<T>>())
    }

    /// The free-list for `T`, created with `initial` instances on first use
    fn list_mut<T: TweenValue>(&mut self, initial: usize) -> Option<&mut FreeList<T>> {
        let expand_count = self.config.expand_count.max(1);
        let clock = Rc::clone(&self.clock);
        let defaults = self.defaults;

        let entry = self.lists.entry(TypeId::of::<T>()).or_insert_with(|| {
            let mut list = FreeList::<T> {
                free: Vec::with_capacity(initial),
                preloaded: 0,
                lent: 0,
                expand_count,
            };
            grow(&mut list, &clock, defaults, initial);
            Box::new(list) as Box<dyn ErasedFreeList>
        });

        entry.as_any_mut().downcast_mut::<FreeList<T>>()
    }
}

fn grow<T: TweenValue>(
    list: &mut FreeList<T>,
    clock: &Rc<dyn Clock>,
    defaults: TweenDefaults,
    count: usize,
) {
    list.free.reserve(count);
    for _ in 0..count {
        let mut tween = Tween::with_defaults(Rc::clone(clock), defaults);
        tween.set_recycled(true);
        list.free.push(Rc::new(TweenCell::new(tween, true)));
    }
    list.preloaded += count;
}

impl std::fmt::Debug for TweenPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TweenPool")
            .field("config", &self.config)
            .field("types", &self.lists.len())
            .finish()
    }
}
