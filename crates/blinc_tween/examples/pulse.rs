//! Pulse Demo
//!
//! Drives a looping scale pulse and a one-shot fade on the system clock and
//! logs their values.
//!
//! Run with: RUST_LOG=debug cargo run -p blinc_tween --example pulse

use blinc_tween::{Easing, LoopType, Result, SystemClock, TweenManager};
use std::rc::Rc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let manager = TweenManager::new(Rc::new(SystemClock::new()));

    let pulse = manager.tween_from_to(1.0_f32, 1.2, 0.4);
    pulse.with_mut(|t| {
        t.set_ease(Easing::EaseInOutSine)
            .set_loops(-1, LoopType::Yoyo);
    })?;
    pulse.rename("pulse");
    pulse.on_update(|scale| tracing::info!("scale = {:.3}", scale))?;
    pulse.play();

    let fade = manager.tween_from_to(1.0_f32, 0.0, 1.5);
    fade.with_mut(|t| {
        t.set_delay(0.5).set_ease(Easing::EaseOutCubic);
    })?;
    fade.on_update(|opacity| tracing::info!("opacity = {:.3}", opacity))?;
    fade.on_complete(|id| tracing::info!("fade {} complete", id))?;
    fade.play();

    for _ in 0..(3 * 30) {
        manager.update();
        thread::sleep(Duration::from_millis(33));
    }

    tracing::info!("{:?}", manager.stats());
    for stats in manager.pool_stats() {
        tracing::info!("{:?}", stats);
    }

    manager.get_by_short_id::<f32>("pulse")?.kill(false);
    Ok(())
}
