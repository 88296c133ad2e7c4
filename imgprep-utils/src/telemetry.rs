//! Scoped timing logs for pipeline stages and model inference.
//!
//! A [`TimingGuard`] measures the lifetime of a scope and reports it on the
//! `imgprep::telemetry` log target when dropped. Guards only activate when telemetry
//! has been switched on through [`configure`] and both the telemetry threshold and the
//! global logger accept the requested level, so inactive guards cost one `Instant`.

use std::{
    borrow::Cow,
    sync::atomic::{AtomicU8, Ordering},
    time::{Duration, Instant},
};

use log::{Level, LevelFilter, log, log_enabled};

/// Log target used by every timing guard.
pub const TELEMETRY_TARGET: &str = "imgprep::telemetry";

// 0 disables telemetry; otherwise the most verbose accepted level (1 = error .. 5 = trace).
static THRESHOLD: AtomicU8 = AtomicU8::new(0);

/// Reports how long a scope took once it is dropped.
#[derive(Debug)]
pub struct TimingGuard {
    label: Cow<'static, str>,
    level: Level,
    start: Instant,
    active: bool,
}

impl TimingGuard {
    /// Returns `true` when the guard will log on drop.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Time elapsed since the guard was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the guard without logging and return the elapsed time.
    pub fn finish(mut self) -> Duration {
        self.active = false;
        self.start.elapsed()
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        log!(
            target: TELEMETRY_TARGET,
            self.level,
            "{} completed in {:.2?}",
            self.label,
            self.start.elapsed()
        );
    }
}

/// Start timing a scope, logging at `level` when telemetry allows it.
pub fn timing_guard(label: impl Into<Cow<'static, str>>, level: Level) -> TimingGuard {
    timing_guard_if(label, level, true)
}

/// Like [`timing_guard`], with an extra caller-controlled switch.
pub fn timing_guard_if(
    label: impl Into<Cow<'static, str>>,
    level: Level,
    enabled: bool,
) -> TimingGuard {
    let active =
        enabled && telemetry_allows(level) && log_enabled!(target: TELEMETRY_TARGET, level);
    TimingGuard {
        label: label.into(),
        level,
        start: Instant::now(),
        active,
    }
}

/// Enable or disable telemetry and set its verbosity threshold.
pub fn configure(enabled: bool, level: LevelFilter) {
    let threshold = if enabled { level as u8 } else { 0 };
    THRESHOLD.store(threshold, Ordering::Relaxed);
}

/// Whether telemetry is switched on with a non-`Off` threshold.
pub fn telemetry_enabled() -> bool {
    THRESHOLD.load(Ordering::Relaxed) > 0
}

/// The currently configured telemetry threshold.
pub fn telemetry_level() -> LevelFilter {
    match THRESHOLD.load(Ordering::Relaxed) {
        1 => LevelFilter::Error,
        2 => LevelFilter::Warn,
        3 => LevelFilter::Info,
        4 => LevelFilter::Debug,
        5 => LevelFilter::Trace,
        _ => LevelFilter::Off,
    }
}

/// Whether a guard at `level` would pass the telemetry threshold.
pub fn telemetry_allows(level: Level) -> bool {
    level <= telemetry_level()
}
