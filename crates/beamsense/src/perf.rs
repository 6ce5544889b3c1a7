// perf.rs - Timing instrumentation for beamsense
//
// Controlled via the BEAMSENSE_PERF environment variable:
//   BEAMSENSE_PERF=1 beamsense complete lists:     # log request and probe timings
//   BEAMSENSE_PERF=verbose beamsense complete ...  # also warn on slow operations

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PerfMode {
    Off,
    On,
    Verbose,
}

static PERF_MODE: OnceLock<PerfMode> = OnceLock::new();

fn parse_mode(value: &str) -> PerfMode {
    match value.to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "off" => PerfMode::Off,
        "verbose" => PerfMode::Verbose,
        _ => PerfMode::On,
    }
}

fn mode() -> PerfMode {
    *PERF_MODE.get_or_init(|| {
        std::env::var("BEAMSENSE_PERF")
            .map(|v| parse_mode(&v))
            .unwrap_or(PerfMode::Off)
    })
}

/// Whether `BEAMSENSE_PERF` turns timing on
pub fn is_enabled() -> bool {
    mode() != PerfMode::Off
}

/// Scope timer. Logs on drop when timing is enabled; in verbose mode it
/// also warns when the scope ran past its threshold.
///
/// ```
/// use beamsense::perf::TimingGuard;
///
/// let _guard = TimingGuard::new("complete");
/// ```
pub struct TimingGuard {
    name: &'static str,
    /// `None` when timing is off
    start: Option<Instant>,
    warn_after: Option<Duration>,
}

impl TimingGuard {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            start: is_enabled().then(Instant::now),
            warn_after: None,
        }
    }

    pub fn with_threshold(name: &'static str, threshold_ms: u64) -> Self {
        Self {
            warn_after: Some(Duration::from_millis(threshold_ms)),
            ..Self::new(name)
        }
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let Some(start) = self.start else {
            return;
        };
        let elapsed = start.elapsed();
        log::info!("[PERF] {} took {:?}", self.name, elapsed);

        match self.warn_after {
            Some(limit) if elapsed > limit && mode() == PerfMode::Verbose => {
                log::warn!("[PERF] {} slower than {:?}: {:?}", self.name, limit, elapsed)
            }
            _ => {}
        }
    }
}

static PROBE_CALLS: AtomicUsize = AtomicUsize::new(0);
static PROBE_MICROS: AtomicU64 = AtomicU64::new(0);

/// Record one probe VM invocation and how long it took.
pub fn record_probe_call(duration: Duration) {
    PROBE_CALLS.fetch_add(1, Ordering::Relaxed);
    PROBE_MICROS.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
}

/// Number of probe VM invocations so far
pub fn probe_calls() -> usize {
    PROBE_CALLS.load(Ordering::Relaxed)
}

/// Total wall time spent in probe VMs
pub fn probe_total_duration() -> Duration {
    Duration::from_micros(PROBE_MICROS.load(Ordering::Relaxed))
}

/// Log the probe counters. Does nothing unless timing is enabled.
pub fn log_summary() {
    if !is_enabled() {
        return;
    }
    log::info!(
        "[PERF] {} probe call(s), {:?} total",
        probe_calls(),
        probe_total_duration()
    );
}
