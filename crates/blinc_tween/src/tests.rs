//! Scenario tests for the tween engine
//!
//! Everything runs on a [`ManualClock`] so ticks are deterministic.

use crate::callbacks::CallbackKind;
use crate::clock::ManualClock;
use crate::config::{PoolConfig, TweenConfig};
use crate::easing::Easing;
use crate::error::TweenError;
use crate::manager::TweenManager;
use crate::task::TweenHandle;
use crate::tween::{LoopType, Tween, TweenId};
use crate::values::Vec2;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn setup() -> (Rc<ManualClock>, TweenManager) {
    let clock = Rc::new(ManualClock::new());
    let manager = TweenManager::new(clock.clone());
    (clock, manager)
}

/// Linear tween from `start` to `end`, registered but not playing
fn linear(manager: &TweenManager, start: f32, end: f32, duration: f64) -> TweenHandle<f32> {
    let handle = manager.tween_from_to(start, end, duration);
    handle
        .with_mut(|t| {
            t.set_ease(Easing::Linear);
        })
        .unwrap();
    handle
}

/// Count value updates on a tween
fn count_updates(handle: &TweenHandle<f32>) -> Rc<Cell<usize>> {
    let count = Rc::new(Cell::new(0));
    let counter = count.clone();
    handle
        .on_update(move |_| counter.set(counter.get() + 1))
        .unwrap();
    count
}

// ============================================================================
// Timing
// ============================================================================

#[test]
fn test_concrete_delay_scenario_through_manager() {
    let (_clock, manager) = setup();
    let handle = linear(&manager, 0.0, 10.0, 1.0);
    handle
        .with_mut(|t| {
            t.set_delay(0.2);
        })
        .unwrap();

    let completes = Rc::new(Cell::new(0));
    {
        let completes = completes.clone();
        handle
            .on_complete(move |_| completes.set(completes.get() + 1))
            .unwrap();
    }
    let delay_ticks = Rc::new(Cell::new(0));
    {
        let delay_ticks = delay_ticks.clone();
        handle
            .with_mut(|t| {
                t.on_delay_update(move |_| delay_ticks.set(delay_ticks.get() + 1));
            })
            .unwrap();
    }
    let updates = count_updates(&handle);
    handle.play();
    let id = handle.id();

    manager.update_at(0.0);
    assert_eq!(handle.with(|t| t.elapsed()), Some(0.0));
    assert_eq!(updates.get(), 0);
    assert_eq!(delay_ticks.get(), 1);

    manager.update_at(0.2);
    assert_eq!(handle.value(), Some(0.0));

    manager.update_at(0.7);
    let value = handle.value().unwrap();
    assert!((value - 5.0).abs() < 1e-4);
    assert!((handle.with(|t| t.elapsed()).unwrap() - 0.5).abs() < 1e-9);

    // Capture the end value before the instance goes back to the pool
    let last = Rc::new(Cell::new(0.0_f32));
    {
        let last = last.clone();
        handle.on_update(move |v| last.set(*v)).unwrap();
    }
    manager.update_at(1.2);
    assert_eq!(last.get(), 10.0);
    assert_eq!(completes.get(), 1);
    assert!(!manager.contains(id));
    assert_eq!(manager.active_count(), 0);
}

#[test]
fn test_linear_determinism() {
    let (_clock, manager) = setup();
    let handle = linear(&manager, -4.0, 4.0, 2.0);
    handle
        .with_mut(|t| {
            t.set_auto_kill(false);
        })
        .unwrap();
    handle.play();

    for i in 0..=20 {
        let t = i as f64 * 0.1;
        manager.update_at(t);
        let expected = -4.0 + 8.0 * (t / 2.0) as f32;
        let value = handle.value().unwrap();
        assert!((value - expected).abs() < 1e-4, "t = {t}: {value} vs {expected}");
    }
    assert_eq!(handle.value(), Some(4.0));
    assert!(handle.is_completed());
}

#[test]
fn test_restart_loop_completes_three_passes() {
    let (_clock, manager) = setup();
    let handle = linear(&manager, 0.0, 1.0, 1.0);
    handle
        .with_mut(|t| {
            t.set_loops(2, LoopType::Restart).set_auto_kill(false);
        })
        .unwrap();

    let events = Rc::new(RefCell::new(Vec::new()));
    for kind in [CallbackKind::Rewind, CallbackKind::Complete] {
        let events = events.clone();
        manager
            .on_lifecycle(handle.id(), kind, move |_| events.borrow_mut().push(kind))
            .unwrap();
    }
    handle.play();

    let mut t = 0.0;
    while t <= 4.0 {
        manager.update_at(t);
        t += 0.125;
    }

    assert_eq!(
        *events.borrow(),
        vec![
            CallbackKind::Rewind,
            CallbackKind::Rewind,
            CallbackKind::Complete
        ]
    );
    assert_eq!(handle.with(|t| t.current_loop()), Some(3));
    assert_eq!(handle.value(), Some(1.0));
}

#[test]
fn test_yoyo_parity_through_manager() {
    for loops in 0..=4 {
        let (_clock, manager) = setup();
        let handle = linear(&manager, 3.0, 9.0, 0.5);
        handle
            .with_mut(|t| {
                t.set_loops(loops, LoopType::Yoyo).set_auto_kill(false);
            })
            .unwrap();
        handle.play();

        let mut t = 0.0;
        while !handle.is_completed() {
            manager.update_at(t);
            t += 0.25;
            assert!(t < 10.0, "yoyo with {loops} loops never completed");
        }

        let expected = if loops % 2 == 1 { 3.0 } else { 9.0 };
        assert_eq!(handle.value(), Some(expected), "loops = {loops}");
    }
}

#[test]
fn test_yoyo_visits_end_then_returns() {
    let (_clock, manager) = setup();
    let handle = linear(&manager, 0.0, 10.0, 1.0);
    handle
        .with_mut(|t| {
            t.set_loops(1, LoopType::Yoyo).set_auto_kill(false);
        })
        .unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    {
        let seen = seen.clone();
        handle.on_update(move |v| seen.borrow_mut().push(*v)).unwrap();
    }
    handle.play();

    for i in 0..=8 {
        manager.update_at(i as f64 * 0.25);
    }

    let seen = seen.borrow();
    let peak = seen.iter().cloned().fold(f32::MIN, f32::max);
    assert_eq!(peak, 10.0);
    assert_eq!(*seen.last().unwrap(), 0.0);
}

#[test]
fn test_pause_resume_without_time_passing() {
    let (clock, manager) = setup();
    let handle = linear(&manager, 0.0, 10.0, 1.0);
    handle.play();
    clock.set(0.3);
    manager.update();

    let before = (handle.value(), handle.with(|t| t.elapsed()));
    handle.pause().resume();
    assert_eq!((handle.value(), handle.with(|t| t.elapsed())), before);

    manager.update();
    assert_eq!(handle.with(|t| t.elapsed()), before.1);
}

#[test]
fn test_kill_variants() {
    let (_clock, manager) = setup();
    let keep = linear(&manager, 0.0, 10.0, 1.0);
    let snap = linear(&manager, 0.0, 10.0, 1.0);

    let kept = Rc::new(Cell::new(f32::NAN));
    {
        let kept = kept.clone();
        keep.on_update(move |v| kept.set(*v)).unwrap();
    }
    let snapped = Rc::new(Cell::new(f32::NAN));
    {
        let snapped = snapped.clone();
        snap.on_update(move |v| snapped.set(*v)).unwrap();
    }
    let order = Rc::new(RefCell::new(Vec::new()));
    for kind in [CallbackKind::Stop, CallbackKind::Kill, CallbackKind::Complete] {
        let order = order.clone();
        manager
            .on_lifecycle(snap.id(), kind, move |_| order.borrow_mut().push(kind))
            .unwrap();
    }

    keep.play();
    snap.play();
    manager.update_at(0.0);
    manager.update_at(0.4);

    let at_kill = keep.value().unwrap();
    keep.kill(false);
    // No snap to the end value
    assert_eq!(kept.get(), at_kill);
    assert!(keep.is_stale());

    snap.kill(true);
    assert_eq!(snapped.get(), 10.0);
    assert_eq!(
        *order.borrow(),
        vec![CallbackKind::Complete, CallbackKind::Kill, CallbackKind::Stop]
    );
}

#[test]
fn test_kill_without_complete_keeps_value_on_unpooled_tween() {
    let clock = Rc::new(ManualClock::new());
    let manager = TweenManager::new(clock.clone());
    let mut tween = Tween::new(clock.clone(), 0.0_f32, 10.0, 1.0);
    tween.set_ease(Easing::Linear);
    let handle = manager.add(tween);
    handle.play();
    manager.update_at(0.4);

    handle.kill(false);
    assert!(handle.is_killed());
    assert!((handle.value().unwrap() - 4.0).abs() < 1e-5);
    assert!(!manager.contains(handle.id()));
}

// ============================================================================
// Pool
// ============================================================================

#[test]
fn test_pool_round_trip_behaves_like_fresh() {
    let config = TweenConfig {
        pool: PoolConfig {
            preload: 1,
            auto_expand: false,
            ..PoolConfig::default()
        },
        ..TweenConfig::default()
    };
    let clock = Rc::new(ManualClock::new());
    let manager = TweenManager::with_config(clock.clone(), config);

    let run = |handle: &TweenHandle<f32>| -> Vec<f32> {
        let values = Rc::new(RefCell::new(Vec::new()));
        {
            let values = values.clone();
            handle.on_update(move |v| values.borrow_mut().push(*v)).unwrap();
        }
        handle
            .with_mut(|t| {
                t.initialize_from(1.0, 3.0, 1.0)
                    .set_ease(Easing::EaseInOutQuad)
                    .set_delay(0.25);
            })
            .unwrap();
        clock.set(0.0);
        handle.play();
        for i in 0..=6 {
            manager.update_at(i as f64 * 0.25);
        }
        let out = values.borrow().clone();
        out
    };

    let stale_hits = Rc::new(Cell::new(0));
    let first = manager.create_tween::<f32>().unwrap();
    {
        let stale_hits = stale_hits.clone();
        first
            .on_complete(move |_| stale_hits.set(stale_hits.get() + 1))
            .unwrap();
    }
    let first_values = run(&first);
    assert_eq!(stale_hits.get(), 1);
    assert!(first.is_stale());

    let stats = manager.pool_stats_for::<f32>().unwrap();
    assert_eq!((stats.free, stats.lent), (1, 0));

    let second = manager.create_tween::<f32>().unwrap();
    assert_eq!(second.with(|t| t.is_killed()), Some(false));
    assert_eq!(second.with(|t| t.is_recycled()), Some(false));
    let second_values = run(&second);

    // Same samples, and the first use's complete callback is gone
    assert_eq!(first_values, second_values);
    assert_eq!(stale_hits.get(), 1);
}

#[test]
fn test_pool_exhaustion_without_auto_expand() {
    let config = TweenConfig {
        pool: PoolConfig {
            preload: 2,
            auto_expand: false,
            ..PoolConfig::default()
        },
        ..TweenConfig::default()
    };
    let manager = TweenManager::with_config(Rc::new(ManualClock::new()), config);

    assert!(manager.create_tween::<Vec2>().is_some());
    assert!(manager.create_tween::<Vec2>().is_some());
    assert!(manager.create_tween::<Vec2>().is_none());
    assert!(matches!(
        manager.try_create_tween::<Vec2>(),
        Err(TweenError::PoolExhausted { .. })
    ));

    // tween_to falls back to an unpooled instance
    let fallback = manager.tween_to(Vec2::new(1.0, 1.0), 1.0);
    assert!(!fallback.is_pooled());
    assert_eq!(manager.registered_count(), 3);

    let stats = manager.pool_stats_for::<Vec2>().unwrap();
    assert_eq!(stats.lent, 2);
    assert!((stats.usage_percent - 100.0).abs() < 1e-4);
}

#[test]
fn test_disabled_pool_builds_fresh_tweens() {
    let config = TweenConfig {
        pool: PoolConfig {
            enabled: false,
            ..PoolConfig::default()
        },
        ..TweenConfig::default()
    };
    let manager = TweenManager::with_config(Rc::new(ManualClock::new()), config);
    let handle = manager.create_tween::<f32>().unwrap();
    assert!(!handle.is_pooled());
    assert!(manager.pool_stats().is_empty());
}

// ============================================================================
// Mutation during a tick
// ============================================================================

#[test]
fn test_tween_created_in_complete_callback_starts_next_tick() {
    let (_clock, manager) = setup();
    let first = linear(&manager, 0.0, 1.0, 0.5);
    let bystander = linear(&manager, 0.0, 1.0, 10.0);
    let bystander_updates = count_updates(&bystander);

    let spawned: Rc<RefCell<Option<TweenHandle<f32>>>> = Rc::new(RefCell::new(None));
    let spawned_updates = Rc::new(Cell::new(0));
    {
        let weak = manager.handle();
        let spawned = spawned.clone();
        let spawned_updates = spawned_updates.clone();
        first
            .on_complete(move |_| {
                let Some(manager) = weak.upgrade() else {
                    return;
                };
                let next = manager.tween_to(5.0_f32, 1.0);
                let counter = spawned_updates.clone();
                next.on_update(move |_| counter.set(counter.get() + 1)).unwrap();
                next.play();
                *spawned.borrow_mut() = Some(next);
            })
            .unwrap();
    }

    first.play();
    bystander.play();
    manager.update_at(0.0);
    manager.update_at(0.5);

    // The bystander after `first` still advanced exactly once this tick
    assert_eq!(bystander_updates.get(), 2);
    assert!(spawned.borrow().is_some());
    assert_eq!(spawned_updates.get(), 0);
    assert_eq!(manager.pending_count(), 1);

    manager.update_at(0.6);
    assert_eq!(spawned_updates.get(), 1);
    assert_eq!(bystander_updates.get(), 3);
}

#[test]
fn test_self_replay_from_complete_callback() {
    let (clock, manager) = setup();
    let handle = linear(&manager, 0.0, 1.0, 1.0);
    handle
        .with_mut(|t| {
            t.set_auto_kill(false);
        })
        .unwrap();

    let completes = Rc::new(Cell::new(0));
    {
        let me = handle.clone();
        let completes = completes.clone();
        handle
            .on_complete(move |_| {
                completes.set(completes.get() + 1);
                if completes.get() == 1 {
                    me.play();
                }
            })
            .unwrap();
    }

    handle.play();
    manager.update_at(0.0);
    clock.set(1.0);
    manager.update_at(1.0);

    // Replayed: still active, restarted at the clock time of the replay
    assert_eq!(completes.get(), 1);
    assert!(handle.is_playing());
    assert_eq!(manager.active_count(), 1);

    manager.update_at(1.5);
    assert!((handle.value().unwrap() - 0.5).abs() < 1e-5);

    manager.update_at(2.0);
    assert_eq!(completes.get(), 2);
    assert!(handle.is_completed());
    assert_eq!(manager.active_count(), 0);
    assert!(manager.contains(handle.id()));
}

#[test]
fn test_killing_a_later_tween_mid_tick_skips_it() {
    let (_clock, manager) = setup();
    let killer = linear(&manager, 0.0, 1.0, 1.0);
    let victim = linear(&manager, 0.0, 1.0, 1.0);
    let victim_updates = count_updates(&victim);
    let victim_id: TweenId = victim.id();
    {
        let weak = manager.handle();
        killer
            .on_update(move |v| {
                if *v >= 0.5 {
                    if let Some(manager) = weak.upgrade() {
                        manager.kill(victim_id, false);
                    }
                }
            })
            .unwrap();
    }

    killer.play();
    victim.play();
    manager.update_at(0.0);
    assert_eq!(victim_updates.get(), 1);

    manager.update_at(0.5);
    assert_eq!(victim_updates.get(), 1);
    assert!(!manager.contains(victim_id));
    assert_eq!(manager.active_count(), 1);
}

#[test]
fn test_recycled_instance_redispensed_mid_tick_is_not_advanced() {
    let config = TweenConfig {
        pool: PoolConfig {
            preload: 2,
            auto_expand: false,
            ..PoolConfig::default()
        },
        ..TweenConfig::default()
    };
    let clock = Rc::new(ManualClock::new());
    let manager = TweenManager::with_config(clock.clone(), config);

    let trigger = manager.create_tween::<f32>().unwrap();
    let victim = manager.create_tween::<f32>().unwrap();
    trigger
        .with_mut(|t| {
            t.initialize(1.0, 1.0);
        })
        .unwrap();
    victim
        .with_mut(|t| {
            t.initialize(1.0, 1.0);
        })
        .unwrap();

    let reborn_updates = Rc::new(Cell::new(0));
    let reborn: Rc<RefCell<Option<TweenHandle<f32>>>> = Rc::new(RefCell::new(None));
    {
        let weak = manager.handle();
        let victim = victim.clone();
        let reborn = reborn.clone();
        let reborn_updates = reborn_updates.clone();
        trigger
            .on_update(move |_| {
                if reborn.borrow().is_some() {
                    return;
                }
                let Some(manager) = weak.upgrade() else {
                    return;
                };
                victim.kill(false);
                // The pool is LIFO, so this is the victim's instance
                let next = manager.create_tween::<f32>().unwrap();
                let counter = reborn_updates.clone();
                next.on_update(move |_| counter.set(counter.get() + 1)).unwrap();
                next.with_mut(|t| {
                    t.initialize(2.0, 1.0);
                })
                .unwrap();
                next.play();
                *reborn.borrow_mut() = Some(next);
            })
            .unwrap();
    }

    trigger.play();
    victim.play();
    manager.update_at(0.0);

    let reborn = reborn.borrow().clone().unwrap();
    assert!(victim.is_stale());
    assert_eq!(reborn.task().id(), reborn.id());
    assert_eq!(reborn_updates.get(), 0);

    manager.update_at(0.1);
    assert_eq!(reborn_updates.get(), 1);
}

#[test]
fn test_reentrant_manager_update_is_ignored() {
    let (_clock, manager) = setup();
    let handle = linear(&manager, 0.0, 1.0, 1.0);
    let inner_calls = Rc::new(Cell::new(0));
    {
        let weak = manager.handle();
        let inner_calls = inner_calls.clone();
        handle
            .on_update(move |_| {
                if let Some(manager) = weak.upgrade() {
                    inner_calls.set(inner_calls.get() + 1);
                    manager.update_at(100.0);
                }
            })
            .unwrap();
    }
    handle.play();
    manager.update_at(0.25);
    assert_eq!(inner_calls.get(), 1);
    assert!((handle.value().unwrap() - 0.25).abs() < 1e-5);
}

// ============================================================================
// Errors and configuration
// ============================================================================

#[test]
fn test_type_mismatch_leaves_tween_untouched() {
    let (_clock, manager) = setup();
    let handle = manager.tween_to(Vec2::new(2.0, 2.0), 1.0);

    let err = manager.on_update::<f32>(handle.id(), |_| {}).unwrap_err();
    match err {
        TweenError::TypeMismatch {
            id,
            expected,
            actual,
        } => {
            assert_eq!(id, handle.id());
            assert_eq!(expected, "f32");
            assert!(actual.ends_with("Vec2"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        handle.with_mut(|t| t.callback_count(CallbackKind::Update)).unwrap(),
        0
    );
    assert!(manager.get::<Vec2>(handle.id()).is_ok());
}

#[test]
fn test_lookup_misses() {
    let (_clock, manager) = setup();
    let handle = linear(&manager, 0.0, 1.0, 1.0);
    let id = handle.id();
    handle.kill(false);

    assert!(manager.task(id).is_none());
    assert!(matches!(manager.get::<f32>(id), Err(TweenError::NotFound(_))));
    assert!(!manager.play(id));
    assert!(handle.with_mut(|_| ()).is_err());
}

#[test]
fn test_config_drives_defaults() {
    let config = TweenConfig::from_toml_str(
        r#"
        [pool]
        preload = 3

        [defaults]
        duration = 0.5
        ease = "linear"
        auto_kill = false
        "#,
    )
    .unwrap();
    let manager = TweenManager::with_config(Rc::new(ManualClock::new()), config);

    let handle = manager.create_tween::<f32>().unwrap();
    handle
        .with_mut(|t| {
            t.set_end(1.0);
        })
        .unwrap();
    assert_eq!(handle.with(|t| t.duration()), Some(0.5));
    assert_eq!(handle.with(|t| t.auto_kill()), Some(false));

    handle.play();
    manager.update_at(0.25);
    assert!((handle.value().unwrap() - 0.5).abs() < 1e-5);
    manager.update_at(0.5);
    assert!(handle.is_completed());
    assert!(!handle.is_killed());
    assert_eq!(manager.pool_stats_for::<f32>().unwrap().preloaded, 3);
}
