//! Tween state machine
//!
//! A [`Tween`] interpolates one value of type `T` from a start value to an
//! end value over a duration. It owns its own timing, looping and callback
//! state; something else (normally the [`TweenManager`](crate::TweenManager))
//! calls [`Tween::update`] once per tick with the current time.
//!
//! # Lifecycle
//!
//! ```text
//! idle ──play──▶ delay ──▶ running ──▶ (loop delay ─▶ running)* ──▶ completed
//!                  │          │  ▲                                     │
//!                  └─pause────┴──┴─resume                        autokill/kill
//!                                                                      ▼
//!                                                                    killed
//! ```
//!
//! `killed` is terminal until [`Tween::reset_state`].

use crate::callbacks::{CallbackId, CallbackKind, CallbackList};
use crate::clock::Clock;
use crate::config::TweenDefaults;
use crate::easing::{Ease, EaseCurve, Easing};
use crate::values::TweenValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Linear progress at or above this snaps to the exact boundary value
pub const COMPLETE_TOLERANCE: f32 = 0.9999;

/// Slack when comparing elapsed time against the duration
const TIME_EPSILON: f64 = 1e-9;

static NEXT_TWEEN_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique tween identifier
///
/// A fresh id is assigned on construction and on every reset, so an id
/// never refers to two different uses of a pooled instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TweenId(u64);

impl TweenId {
    fn next() -> Self {
        TweenId(NEXT_TWEEN_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Default short id: `tw-` followed by the id in base 36
    fn short_string(self) -> String {
        const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
        let mut n = self.0;
        let mut buf = Vec::new();
        loop {
            buf.push(DIGITS[(n % 36) as usize]);
            n /= 36;
            if n == 0 {
                break;
            }
        }
        buf.reverse();
        format!("tw-{}", String::from_utf8_lossy(&buf))
    }
}

impl fmt::Display for TweenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What happens when an iteration ends and loops remain
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoopType {
    /// Jump back to the start value
    #[default]
    Restart,
    /// Play back towards the start value (ping-pong)
    Yoyo,
}

/// Throttling for the step-update callback
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum StepMode {
    /// Fire on every tick that computes a value
    #[default]
    EveryTick,
    /// Fire at most once per interval (seconds)
    Interval(f64),
    /// Fire whenever linear progress moved by at least this much
    Progress(f32),
}

struct TweenCallbacks<T> {
    start: CallbackList<dyn FnMut(TweenId)>,
    stop: CallbackList<dyn FnMut(TweenId)>,
    complete: CallbackList<dyn FnMut(TweenId)>,
    kill: CallbackList<dyn FnMut(TweenId)>,
    pause: CallbackList<dyn FnMut(TweenId)>,
    resume: CallbackList<dyn FnMut(TweenId)>,
    rewind: CallbackList<dyn FnMut(TweenId)>,
    delay_update: CallbackList<dyn FnMut(f32)>,
    update: CallbackList<dyn FnMut(&T)>,
    step_update: CallbackList<dyn FnMut(&T)>,
    progress: CallbackList<dyn FnMut(f32)>,
    eased_progress: CallbackList<dyn FnMut(f32)>,
}

impl<T> TweenCallbacks<T> {
    fn new() -> Self {
        Self {
            start: CallbackList::new(),
            stop: CallbackList::new(),
            complete: CallbackList::new(),
            kill: CallbackList::new(),
            pause: CallbackList::new(),
            resume: CallbackList::new(),
            rewind: CallbackList::new(),
            delay_update: CallbackList::new(),
            update: CallbackList::new(),
            step_update: CallbackList::new(),
            progress: CallbackList::new(),
            eased_progress: CallbackList::new(),
        }
    }

    fn lifecycle(&mut self, kind: CallbackKind) -> Option<&mut CallbackList<dyn FnMut(TweenId)>> {
        match kind {
            CallbackKind::Start => Some(&mut self.start),
            CallbackKind::Stop => Some(&mut self.stop),
            CallbackKind::Complete => Some(&mut self.complete),
            CallbackKind::Kill => Some(&mut self.kill),
            CallbackKind::Pause => Some(&mut self.pause),
            CallbackKind::Resume => Some(&mut self.resume),
            CallbackKind::Rewind => Some(&mut self.rewind),
            _ => None,
        }
    }

    fn remove(&mut self, kind: CallbackKind, id: CallbackId) -> bool {
        match kind {
            CallbackKind::DelayUpdate => self.delay_update.remove(id),
            CallbackKind::Update => self.update.remove(id),
            CallbackKind::StepUpdate => self.step_update.remove(id),
            CallbackKind::Progress => self.progress.remove(id),
            CallbackKind::EasedProgress => self.eased_progress.remove(id),
            other => self
                .lifecycle(other)
                .map(|list| list.remove(id))
                .unwrap_or(false),
        }
    }

    fn len(&mut self, kind: CallbackKind) -> usize {
        match kind {
            CallbackKind::DelayUpdate => self.delay_update.len(),
            CallbackKind::Update => self.update.len(),
            CallbackKind::StepUpdate => self.step_update.len(),
            CallbackKind::Progress => self.progress.len(),
            CallbackKind::EasedProgress => self.eased_progress.len(),
            other => self.lifecycle(other).map(|list| list.len()).unwrap_or(0),
        }
    }

    fn total(&mut self) -> usize {
        [
            CallbackKind::Start,
            CallbackKind::Stop,
            CallbackKind::Complete,
            CallbackKind::Kill,
            CallbackKind::Pause,
            CallbackKind::Resume,
            CallbackKind::Rewind,
            CallbackKind::DelayUpdate,
            CallbackKind::Update,
            CallbackKind::StepUpdate,
            CallbackKind::Progress,
            CallbackKind::EasedProgress,
        ]
        .into_iter()
        .map(|kind| self.len(kind))
        .sum()
    }
}

/// One interpolation instance
pub struct Tween<T: TweenValue> {
    id: TweenId,
    short_id: String,
    clock: Rc<dyn Clock>,
    defaults: TweenDefaults,

    // Timing
    duration: f64,
    delay: f64,
    elapsed: f64,
    start_time: f64,
    pause_time: f64,
    /// Offset actually used when the current run was armed
    armed_delay: f64,
    /// Offset the next `play()` arms with instead of `delay`
    rearm_offset: Option<f64>,

    // Looping
    loop_count: i32,
    current_loop: i32,
    loop_type: LoopType,
    loop_delay: f64,
    waiting_loop_delay: bool,
    delay_per_loop: bool,

    // Values
    default_value: T,
    start_value: T,
    end_value: T,
    current_value: T,
    relative: bool,
    from_mode: bool,

    // Progress
    linear_progress: f32,
    eased_progress: f32,
    ease: Ease,
    reversing: bool,

    // Lifecycle
    started: bool,
    delay_done: bool,
    playing: bool,
    paused: bool,
    completed: bool,
    killed: bool,
    auto_kill: bool,
    recycled: bool,

    // Step throttling
    step_mode: StepMode,
    last_step_time: f64,
    last_step_progress: f32,

    callbacks: TweenCallbacks<T>,
}

impl<T: TweenValue> Tween<T> {
    /// A blank tween using the given defaults
    pub fn with_defaults(clock: Rc<dyn Clock>, defaults: TweenDefaults) -> Self {
        let id = TweenId::next();
        Self {
            id,
            short_id: id.short_string(),
            clock,
            defaults,
            duration: defaults.duration.max(0.0),
            delay: 0.0,
            elapsed: 0.0,
            start_time: 0.0,
            pause_time: 0.0,
            armed_delay: 0.0,
            rearm_offset: None,
            loop_count: 0,
            current_loop: 0,
            loop_type: defaults.loop_type,
            loop_delay: 0.0,
            waiting_loop_delay: false,
            delay_per_loop: false,
            default_value: T::default(),
            start_value: T::default(),
            end_value: T::default(),
            current_value: T::default(),
            relative: false,
            from_mode: false,
            linear_progress: 0.0,
            eased_progress: 0.0,
            ease: Ease::Mode(defaults.ease),
            reversing: false,
            started: false,
            delay_done: false,
            playing: false,
            paused: false,
            completed: false,
            killed: false,
            auto_kill: defaults.auto_kill,
            recycled: false,
            step_mode: StepMode::EveryTick,
            last_step_time: 0.0,
            last_step_progress: 0.0,
            callbacks: TweenCallbacks::new(),
        }
    }

    /// A tween from an explicit start value to `end` over `duration` seconds
    pub fn new(clock: Rc<dyn Clock>, start: T, end: T, duration: f64) -> Self {
        let mut tween = Self::with_defaults(clock, TweenDefaults::default());
        tween.initialize_from(start, end, duration);
        tween
    }

    /// A tween from the rest value (`T::default()`) to `end`
    pub fn to(clock: Rc<dyn Clock>, end: T, duration: f64) -> Self {
        let mut tween = Self::with_defaults(clock, TweenDefaults::default());
        tween.initialize(end, duration);
        tween
    }

    /// Install a target and duration on a (typically pooled) instance
    ///
    /// Callbacks are left untouched.
    pub fn initialize(&mut self, end: T, duration: f64) -> &mut Self {
        self.end_value = end;
        self.current_value = self.effective_start().clone();
        self.set_duration(duration)
    }

    /// Like [`initialize`](Self::initialize) with an explicit "from" value
    pub fn initialize_from(&mut self, start: T, end: T, duration: f64) -> &mut Self {
        self.start_value = start;
        self.from_mode = true;
        self.initialize(end, duration)
    }

    /// Clear every callback and restore timing, loop and ease configuration
    /// to the defaults. The tween gets a fresh id.
    pub fn reset_state(&mut self) {
        let clock = Rc::clone(&self.clock);
        *self = Self::with_defaults(clock, self.defaults);
    }

    // =========================================================================
    // Configuration (chainable)
    // =========================================================================

    pub fn set_duration(&mut self, seconds: f64) -> &mut Self {
        if !(seconds >= 0.0) {
            tracing::warn!("Tween {}: invalid duration {}, using 0", self.id, seconds);
            self.duration = 0.0;
        } else {
            self.duration = seconds;
        }
        if self.duration == 0.0 && self.loop_count != 0 {
            tracing::warn!("Tween {}: zero-duration tween cannot loop, loops cleared", self.id);
            self.loop_count = 0;
        }
        self
    }

    pub fn set_delay(&mut self, seconds: f64) -> &mut Self {
        if !(seconds >= 0.0) {
            tracing::warn!("Tween {}: invalid delay {}, using 0", self.id, seconds);
            self.delay = 0.0;
        } else {
            self.delay = seconds;
        }
        self
    }

    pub fn set_ease(&mut self, easing: Easing) -> &mut Self {
        self.ease = Ease::Mode(easing);
        self
    }

    /// Use a custom curve; an empty curve falls back to linear
    pub fn set_ease_curve(&mut self, curve: impl Into<Rc<EaseCurve>>) -> &mut Self {
        let curve = curve.into();
        if curve.is_empty() {
            tracing::warn!("Tween {}: empty ease curve, using linear", self.id);
            self.ease = Ease::Mode(Easing::Linear);
        } else {
            self.ease = Ease::Curve(curve);
        }
        self
    }

    /// Set the loop count (`-1` infinite, `0` once, `n` once plus n repeats)
    pub fn set_loops(&mut self, count: i32, loop_type: LoopType) -> &mut Self {
        self.loop_type = loop_type;
        let count = if count < -1 {
            tracing::warn!("Tween {}: loop count {} normalized to -1", self.id, count);
            -1
        } else {
            count
        };
        if count != 0 && self.duration == 0.0 {
            tracing::warn!("Tween {}: zero-duration tween cannot loop, loops ignored", self.id);
            self.loop_count = 0;
        } else {
            self.loop_count = count;
        }
        self
    }

    pub fn set_loop_type(&mut self, loop_type: LoopType) -> &mut Self {
        self.loop_type = loop_type;
        self
    }

    /// Gap inserted between loop iterations (seconds)
    pub fn set_loop_delay(&mut self, seconds: f64) -> &mut Self {
        if !(seconds >= 0.0) {
            tracing::warn!("Tween {}: invalid loop delay {}, using 0", self.id, seconds);
            self.loop_delay = 0.0;
        } else {
            self.loop_delay = seconds;
        }
        self
    }

    /// Re-apply the loop delay as the start offset after a rewind
    pub fn set_delay_per_loop(&mut self, enabled: bool) -> &mut Self {
        self.delay_per_loop = enabled;
        self
    }

    pub fn set_relative(&mut self, relative: bool) -> &mut Self {
        self.relative = relative;
        self
    }

    /// Interpolate from an explicit value instead of the rest value
    pub fn set_from(&mut self, start: T) -> &mut Self {
        self.start_value = start;
        self.from_mode = true;
        if !self.started {
            self.current_value = self.start_value.clone();
        }
        self
    }

    /// Set the implicit rest value (the value captured at start)
    pub fn set_default_value(&mut self, value: T) -> &mut Self {
        self.default_value = value;
        if !self.started && !self.from_mode {
            self.current_value = self.default_value.clone();
        }
        self
    }

    pub fn set_end(&mut self, end: T) -> &mut Self {
        self.end_value = end;
        self
    }

    pub fn set_auto_kill(&mut self, auto_kill: bool) -> &mut Self {
        self.auto_kill = auto_kill;
        self
    }

    pub fn set_step_mode(&mut self, mode: StepMode) -> &mut Self {
        self.step_mode = match mode {
            StepMode::Interval(seconds) if !(seconds > 0.0) => {
                tracing::warn!("Tween {}: step interval {} invalid, stepping every tick", self.id, seconds);
                StepMode::EveryTick
            }
            StepMode::Progress(step) if !(step > 0.0 && step <= 1.0) => {
                tracing::warn!("Tween {}: step progress {} invalid, stepping every tick", self.id, step);
                StepMode::EveryTick
            }
            mode => mode,
        };
        self
    }

    pub(crate) fn set_short_id(&mut self, short_id: impl Into<String>) -> &mut Self {
        self.short_id = short_id.into();
        self
    }

    pub(crate) fn set_recycled(&mut self, recycled: bool) {
        self.recycled = recycled;
    }

    // =========================================================================
    // Callbacks
    // =========================================================================

    pub fn on_start(&mut self, f: impl FnMut(TweenId) + 'static) -> CallbackId {
        self.callbacks.start.add(Box::new(f))
    }

    pub fn on_stop(&mut self, f: impl FnMut(TweenId) + 'static) -> CallbackId {
        self.callbacks.stop.add(Box::new(f))
    }

    pub fn on_complete(&mut self, f: impl FnMut(TweenId) + 'static) -> CallbackId {
        self.callbacks.complete.add(Box::new(f))
    }

    pub fn on_kill(&mut self, f: impl FnMut(TweenId) + 'static) -> CallbackId {
        self.callbacks.kill.add(Box::new(f))
    }

    pub fn on_pause(&mut self, f: impl FnMut(TweenId) + 'static) -> CallbackId {
        self.callbacks.pause.add(Box::new(f))
    }

    pub fn on_resume(&mut self, f: impl FnMut(TweenId) + 'static) -> CallbackId {
        self.callbacks.resume.add(Box::new(f))
    }

    pub fn on_rewind(&mut self, f: impl FnMut(TweenId) + 'static) -> CallbackId {
        self.callbacks.rewind.add(Box::new(f))
    }

    /// Receives the initial (or loop) delay progress in `[0, 1]`
    pub fn on_delay_update(&mut self, f: impl FnMut(f32) + 'static) -> CallbackId {
        self.callbacks.delay_update.add(Box::new(f))
    }

    /// Receives the freshly computed value every tick
    pub fn on_update(&mut self, f: impl FnMut(&T) + 'static) -> CallbackId {
        self.callbacks.update.add(Box::new(f))
    }

    /// Like `on_update`, throttled by the step mode
    pub fn on_step_update(&mut self, f: impl FnMut(&T) + 'static) -> CallbackId {
        self.callbacks.step_update.add(Box::new(f))
    }

    pub fn on_progress(&mut self, f: impl FnMut(f32) + 'static) -> CallbackId {
        self.callbacks.progress.add(Box::new(f))
    }

    pub fn on_eased_progress(&mut self, f: impl FnMut(f32) + 'static) -> CallbackId {
        self.callbacks.eased_progress.add(Box::new(f))
    }

    /// Subscribe a lifecycle callback by kind; value kinds return `None`
    pub fn on_lifecycle(
        &mut self,
        kind: CallbackKind,
        f: Box<dyn FnMut(TweenId)>,
    ) -> Option<CallbackId> {
        self.callbacks.lifecycle(kind).map(|list| list.add(f))
    }

    /// Unsubscribe one callback; returns false if it was not subscribed
    pub fn remove_callback(&mut self, kind: CallbackKind, id: CallbackId) -> bool {
        self.callbacks.remove(kind, id)
    }

    pub fn callback_count(&mut self, kind: CallbackKind) -> usize {
        self.callbacks.len(kind)
    }

    pub fn total_callbacks(&mut self) -> usize {
        self.callbacks.total()
    }

    fn fire(&mut self, kind: CallbackKind) {
        let id = self.id;
        if let Some(list) = self.callbacks.lifecycle(kind) {
            list.fire_with(|cb| cb(id));
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> TweenId {
        self.id
    }

    pub fn short_id(&self) -> &str {
        &self.short_id
    }

    pub fn clock(&self) -> &Rc<dyn Clock> {
        &self.clock
    }

    pub fn defaults(&self) -> TweenDefaults {
        self.defaults
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn delay(&self) -> f64 {
        self.delay
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Absolute time at which the current delay ends
    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn loop_count(&self) -> i32 {
        self.loop_count
    }

    pub fn current_loop(&self) -> i32 {
        self.current_loop
    }

    pub fn loop_type(&self) -> LoopType {
        self.loop_type
    }

    pub fn loop_delay(&self) -> f64 {
        self.loop_delay
    }

    pub fn value(&self) -> &T {
        &self.current_value
    }

    pub fn start_value(&self) -> &T {
        &self.start_value
    }

    pub fn end_value(&self) -> &T {
        &self.end_value
    }

    pub fn default_value(&self) -> &T {
        &self.default_value
    }

    /// Linear progress of the current iteration
    pub fn progress(&self) -> f32 {
        self.linear_progress
    }

    pub fn eased_progress(&self) -> f32 {
        self.eased_progress
    }

    pub fn ease(&self) -> &Ease {
        &self.ease
    }

    pub fn step_mode(&self) -> StepMode {
        self.step_mode
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn is_killed(&self) -> bool {
        self.killed
    }

    pub fn is_looping(&self) -> bool {
        self.loop_count != 0
    }

    pub fn is_reversing(&self) -> bool {
        self.reversing
    }

    pub fn is_waiting_loop_delay(&self) -> bool {
        self.waiting_loop_delay
    }

    pub fn is_relative(&self) -> bool {
        self.relative
    }

    pub fn is_from_mode(&self) -> bool {
        self.from_mode
    }

    pub fn auto_kill(&self) -> bool {
        self.auto_kill
    }

    pub fn is_recycled(&self) -> bool {
        self.recycled
    }

    // =========================================================================
    // Control
    // =========================================================================

    /// Start (or restart after completion) playback
    ///
    /// The start callback fires on every call, including while already
    /// playing.
    pub fn play(&mut self) -> &mut Self {
        if self.killed {
            tracing::warn!("Tween {}: play() on a killed tween ignored", self.id);
            return self;
        }

        if self.completed {
            self.reset_progress();
        }

        if self.paused {
            self.resume();
        } else if !self.playing {
            if !self.started {
                let now = self.clock.now();
                let offset = self.rearm_offset.take().unwrap_or(self.delay);
                self.started = true;
                self.armed_delay = offset;
                self.start_time = now + offset;
                self.delay_done = offset <= 0.0;
                self.current_value = self.effective_start().clone();
                self.last_step_time = now;
                self.last_step_progress = 0.0;
            }
            self.playing = true;
        }

        self.fire(CallbackKind::Start);
        self
    }

    pub fn pause(&mut self) -> &mut Self {
        if self.killed || !self.playing {
            tracing::trace!("Tween {}: pause() while not playing ignored", self.id);
            return self;
        }
        self.pause_time = self.clock.now();
        self.paused = true;
        self.playing = false;
        self.fire(CallbackKind::Pause);
        self
    }

    /// Continue after a pause as if time had stood still
    pub fn resume(&mut self) -> &mut Self {
        if self.killed || !self.paused {
            tracing::trace!("Tween {}: resume() while not paused ignored", self.id);
            return self;
        }
        let now = self.clock.now();
        self.start_time += now - self.pause_time;
        self.paused = false;
        self.playing = true;
        self.fire(CallbackKind::Resume);
        self
    }

    /// Reset progress to zero, then kill or leave the tween idle and re-armable
    pub fn rewind(&mut self, and_kill: bool) -> &mut Self {
        if self.killed {
            tracing::trace!("Tween {}: rewind() on a killed tween ignored", self.id);
            return self;
        }
        self.reset_progress();
        self.current_value = self.effective_start().clone();
        self.fire(CallbackKind::Rewind);

        if and_kill {
            self.kill(false);
        } else if self.delay_per_loop {
            self.rearm_offset = Some(self.loop_delay);
        }
        self
    }

    /// Terminal transition; idempotent
    ///
    /// With `complete`, the value is forced to the end value and the
    /// complete callback fires before kill and stop.
    pub fn kill(&mut self, complete: bool) -> &mut Self {
        if self.killed {
            tracing::trace!("Tween {}: already killed", self.id);
            return self;
        }

        if complete && !self.completed {
            let now = self.clock.now();
            self.elapsed = self.duration;
            self.linear_progress = 1.0;
            self.eased_progress = self.ease.evaluate(1.0);
            self.current_value = self.end_value.clone();
            self.emit_value(now, true);
            self.completed = true;
            self.fire(CallbackKind::Complete);
        }

        self.killed = true;
        self.playing = false;
        self.paused = false;
        self.waiting_loop_delay = false;
        self.fire(CallbackKind::Kill);
        self.fire(CallbackKind::Stop);
        self.current_loop = 0;
        self
    }

    /// Scrub to a linear progress while playing or paused
    pub fn set_progress(&mut self, progress: f32) -> &mut Self {
        if self.killed || !(self.playing || self.paused) {
            tracing::warn!("Tween {}: set_progress() needs a playing or paused tween", self.id);
            return self;
        }
        if !progress.is_finite() {
            tracing::warn!("Tween {}: invalid progress {}, ignored", self.id, progress);
            return self;
        }

        let now = self.clock.now();
        self.linear_progress = progress.clamp(0.0, 1.0);
        self.elapsed = self.linear_progress as f64 * self.duration;
        let reference = if self.paused { self.pause_time } else { now };
        self.start_time = reference - self.elapsed;
        self.delay_done = true;
        self.waiting_loop_delay = false;
        self.apply_progress(now);
        self
    }

    /// Advance one tick
    ///
    /// Returns `false` once the tween should leave the active set: it was
    /// killed, completed, paused, or never played.
    pub fn update(&mut self, now: f64) -> bool {
        if self.killed || !self.playing || self.paused {
            return false;
        }

        if !self.delay_done {
            if now < self.start_time {
                let ratio = delay_ratio(now, self.start_time, self.armed_delay);
                self.callbacks.delay_update.fire_with(|cb| cb(ratio));
                return true;
            }
            self.delay_done = true;
        }

        if self.waiting_loop_delay {
            if now < self.start_time {
                let ratio = delay_ratio(now, self.start_time, self.loop_delay);
                self.callbacks.delay_update.fire_with(|cb| cb(ratio));
                return true;
            }
            self.waiting_loop_delay = false;
            self.elapsed = 0.0;
            self.linear_progress = 0.0;
            self.eased_progress = 0.0;
            self.fire(CallbackKind::Rewind);
        }

        self.elapsed = (now - self.start_time).max(0.0);
        if self.elapsed + TIME_EPSILON >= self.duration {
            return self.complete_iteration(now);
        }

        self.linear_progress = (self.elapsed / self.duration).clamp(0.0, 1.0) as f32;
        self.apply_progress(now);
        true
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn effective_start(&self) -> &T {
        if self.from_mode {
            &self.start_value
        } else {
            &self.default_value
        }
    }

    /// The value this iteration is heading towards
    fn heading(&self) -> &T {
        if self.reversing {
            self.effective_start()
        } else {
            &self.end_value
        }
    }

    fn sample(&self, eased: f32) -> T {
        if self.reversing {
            self.end_value.lerp(self.effective_start(), eased)
        } else {
            self.effective_start().lerp(&self.end_value, eased)
        }
    }

    fn apply_progress(&mut self, now: f64) {
        self.eased_progress = self.ease.evaluate(self.linear_progress);
        self.current_value = if self.linear_progress >= COMPLETE_TOLERANCE {
            self.heading().clone()
        } else {
            self.sample(self.eased_progress)
        };
        self.emit_value(now, false);
    }

    /// update → step-update → progress → eased-progress
    fn emit_value(&mut self, now: f64, force_step: bool) {
        let value = &self.current_value;
        self.callbacks.update.fire_with(|cb| cb(value));

        if force_step || self.step_due(now) {
            self.last_step_time = now;
            self.last_step_progress = self.linear_progress;
            let value = &self.current_value;
            self.callbacks.step_update.fire_with(|cb| cb(value));
        }

        let linear = self.linear_progress;
        let eased = self.eased_progress;
        self.callbacks.progress.fire_with(|cb| cb(linear));
        self.callbacks.eased_progress.fire_with(|cb| cb(eased));
    }

    fn step_due(&self, now: f64) -> bool {
        match self.step_mode {
            StepMode::EveryTick => true,
            StepMode::Interval(seconds) => now - self.last_step_time + TIME_EPSILON >= seconds,
            StepMode::Progress(step) => {
                (self.linear_progress - self.last_step_progress).abs() >= step
            }
        }
    }

    fn loops_remaining(&self) -> bool {
        self.loop_count == -1 || self.current_loop <= self.loop_count
    }

    fn complete_iteration(&mut self, now: f64) -> bool {
        self.elapsed = self.duration;
        self.linear_progress = 1.0;
        self.eased_progress = self.ease.evaluate(1.0);
        self.current_loop += 1;

        if !self.loops_remaining() {
            return self.finalize_completion(now);
        }

        match self.loop_type {
            LoopType::Restart => {
                // Hold the end value until the loop delay runs out
                self.current_value = self.end_value.clone();
                self.emit_value(now, true);
                self.start_time = now + self.loop_delay;
                self.waiting_loop_delay = true;
                self.last_step_progress = 0.0;
            }
            LoopType::Yoyo => {
                self.current_value = self.heading().clone();
                self.emit_value(now, true);
                self.reversing = !self.reversing;
                self.start_time = now + self.loop_delay;
                self.elapsed = 0.0;
                self.linear_progress = 0.0;
                self.eased_progress = 0.0;
                self.last_step_progress = 0.0;
                self.fire(CallbackKind::Rewind);
            }
        }
        true
    }

    /// Value a finished tween rests at
    ///
    /// A yoyo plays `loop_count + 1` passes, alternating direction, so it
    /// ends at the start value exactly when `loop_count` is odd.
    fn terminal_value(&self) -> T {
        match self.loop_type {
            LoopType::Yoyo if self.loop_count % 2 != 0 => self.effective_start().clone(),
            _ => self.end_value.clone(),
        }
    }

    fn finalize_completion(&mut self, now: f64) -> bool {
        self.elapsed = self.duration;
        self.linear_progress = 1.0;
        self.eased_progress = self.ease.evaluate(1.0);
        self.current_value = self.terminal_value();
        self.emit_value(now, true);

        self.completed = true;
        self.playing = false;
        self.waiting_loop_delay = false;
        self.fire(CallbackKind::Complete);

        if self.auto_kill {
            self.kill(false);
        }
        false
    }

    fn reset_progress(&mut self) {
        self.elapsed = 0.0;
        self.linear_progress = 0.0;
        self.eased_progress = 0.0;
        self.current_loop = 0;
        self.reversing = false;
        self.waiting_loop_delay = false;
        self.started = false;
        self.delay_done = false;
        self.playing = false;
        self.paused = false;
        self.completed = false;
        self.last_step_progress = 0.0;
    }
}

fn delay_ratio(now: f64, start_time: f64, window: f64) -> f32 {
    if window <= 0.0 {
        return 1.0;
    }
    (1.0 - (start_time - now) / window).clamp(0.0, 1.0) as f32
}

impl<T: TweenValue + fmt::Debug> fmt::Debug for Tween<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tween")
            .field("id", &self.id)
            .field("short_id", &self.short_id)
            .field("duration", &self.duration)
            .field("delay", &self.delay)
            .field("elapsed", &self.elapsed)
            .field("loop", &(self.current_loop, self.loop_count, self.loop_type))
            .field("value", &self.current_value)
            .field("playing", &self.playing)
            .field("paused", &self.paused)
            .field("completed", &self.completed)
            .field("killed", &self.killed)
            .finish()
    }
}
