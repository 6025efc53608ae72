//! Blinc Tween Engine
//!
//! Tick-driven value interpolation with pooling, loops, delays and
//! multi-subscriber callbacks.
//!
//! # Features
//!
//! - **Generic Tweens**: one state machine for any [`Interpolate`] value
//! - **Loops**: restart or yoyo, finite or infinite, with inter-loop delays
//! - **Easing**: Penner family, CSS cubic-beziers, custom baked curves
//! - **Object Pool**: per-type free-lists with preload and auto-expand
//! - **Safe Mutation**: callbacks may create, kill or replay tweens mid-tick
//! - **Injected Clock**: live frame clock or manually driven preview clock
//!
//! # Example
//!
//! ```ignore
//! use blinc_tween::{Easing, LoopType, ManualClock, TweenManager};
//! use std::rc::Rc;
//!
//! let clock = Rc::new(ManualClock::new());
//! let manager = TweenManager::new(clock.clone());
//!
//! let pulse = manager.tween_from_to(1.0_f32, 1.2, 0.4);
//! pulse.with_mut(|t| {
//!     t.set_ease(Easing::EaseInOutSine).set_loops(-1, LoopType::Yoyo);
//! })?;
//! pulse.on_update(|scale| println!("scale = {scale}"))?;
//! pulse.play();
//!
//! clock.advance(1.0 / 60.0);
//! manager.update();
//! ```

pub mod callbacks;
pub mod clock;
pub mod config;
pub mod easing;
pub mod error;
pub mod manager;
pub mod pool;
pub mod task;
pub mod tween;
pub mod values;

#[cfg(test)]
mod tests;

pub use callbacks::{CallbackId, CallbackKind, CallbackList};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ManagerConfig, PoolConfig, TweenConfig, TweenDefaults};
pub use easing::{Ease, EaseCurve, Easing};
pub use error::{Result, TweenError};
pub use manager::{ManagerHandle, TweenManager, TweenStats};
pub use pool::{PoolStats, TweenPool};
pub use task::{TaskStatus, TweenCell, TweenHandle, TweenTask};
pub use tween::{LoopType, StepMode, Tween, TweenId, COMPLETE_TOLERANCE};
pub use values::{Color, Interpolate, TweenValue, Vec2, Vec3};
