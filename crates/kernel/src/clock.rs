use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

const RENDER_HISTORY: usize = 120;

/// Monotonic time source shared by the control thread and both workers.
///
/// Every timestamp is stored as nanoseconds since the clock was created, in
/// an atomic, so any thread can read pacing state without a lock.
#[derive(Debug)]
pub struct Clock {
    start: Instant,
    tick_interval: AtomicU64,
    frame_interval: AtomicU64,
    last_tick: AtomicU64,
    last_frame: AtomicU64,
    frame_delta: AtomicU64,
    render_started: AtomicU64,
    last_render: AtomicU64,
    render_history: Mutex<FrameTimer>,
}

impl Clock {
    /// Create a clock. Rates are in Hz and must be positive.
    pub fn new(tick_rate: f64, frame_rate: f64) -> Self {
        Self {
            start: Instant::now(),
            tick_interval: AtomicU64::new(interval_nanos(tick_rate)),
            frame_interval: AtomicU64::new(interval_nanos(frame_rate)),
            last_tick: AtomicU64::new(0),
            last_frame: AtomicU64::new(0),
            frame_delta: AtomicU64::new(0),
            render_started: AtomicU64::new(0),
            last_render: AtomicU64::new(0),
            render_history: Mutex::new(FrameTimer::new(RENDER_HISTORY)),
        }
    }

    /// Time since the clock was created.
    pub fn uptime(&self) -> Duration {
        self.start.elapsed()
    }

    fn now(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_nanos(self.tick_interval.load(Ordering::Relaxed))
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_nanos(self.frame_interval.load(Ordering::Relaxed))
    }

    /// Change the frame cadence, e.g. when the window moves to another display.
    pub fn set_frame_rate(&self, hz: f64) {
        self.frame_interval
            .store(interval_nanos(hz), Ordering::Relaxed);
    }

    pub fn since_last_tick(&self) -> Duration {
        let last = self.last_tick.load(Ordering::Acquire);
        Duration::from_nanos(self.now().saturating_sub(last))
    }

    pub fn tick_due(&self) -> bool {
        self.since_last_tick() >= self.tick_interval()
    }

    pub fn frame_due(&self) -> bool {
        let last = self.last_frame.load(Ordering::Acquire);
        Duration::from_nanos(self.now().saturating_sub(last)) >= self.frame_interval()
    }

    /// Record that a tick was dispatched now.
    pub fn mark_tick(&self) {
        self.last_tick.store(self.now(), Ordering::Release);
    }

    /// Record that a frame was dispatched now and return the time since the
    /// previous one.
    pub fn mark_frame(&self) -> Duration {
        let now = self.now();
        let previous = self.last_frame.swap(now, Ordering::AcqRel);
        let delta = now.saturating_sub(previous);
        self.frame_delta.store(delta, Ordering::Relaxed);
        Duration::from_nanos(delta)
    }

    pub fn frame_delta(&self) -> Duration {
        Duration::from_nanos(self.frame_delta.load(Ordering::Relaxed))
    }

    pub fn start_render(&self) {
        self.render_started.store(self.now(), Ordering::Relaxed);
    }

    /// Close the render bracket opened by [`start_render`](Self::start_render)
    /// and return its duration.
    pub fn stop_render(&self) -> Duration {
        let started = self.render_started.load(Ordering::Relaxed);
        let elapsed = Duration::from_nanos(self.now().saturating_sub(started));
        self.last_render
            .store(elapsed.as_nanos() as u64, Ordering::Relaxed);
        self.render_history.lock().record(elapsed);
        elapsed
    }

    pub fn last_render(&self) -> Duration {
        Duration::from_nanos(self.last_render.load(Ordering::Relaxed))
    }

    /// Snapshot of recent render durations.
    pub fn render_timings(&self) -> RenderTimings {
        let history = self.render_history.lock();
        RenderTimings {
            samples: history.count(),
            average: history.average(),
            min: history.min(),
            max: history.max(),
        }
    }
}

fn interval_nanos(hz: f64) -> u64 {
    if hz.is_finite() && hz > 0.0 {
        (1e9 / hz) as u64
    } else {
        0
    }
}

/// Summary of the render history kept by [`Clock`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderTimings {
    pub samples: usize,
    pub average: Duration,
    pub min: Duration,
    pub max: Duration,
}

/// Fixed-capacity ring of frame durations.
#[derive(Debug)]
pub struct FrameTimer {
    history: Vec<Duration>,
    capacity: usize,
    index: usize,
    filled: bool,
}

impl FrameTimer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: vec![Duration::ZERO; capacity],
            capacity,
            index: 0,
            filled: false,
        }
    }

    pub fn record(&mut self, dt: Duration) {
        self.history[self.index] = dt;
        self.index = (self.index + 1) % self.capacity;
        if self.index == 0 {
            self.filled = true;
        }
    }

    fn samples(&self) -> &[Duration] {
        &self.history[..self.count()]
    }

    pub fn average(&self) -> Duration {
        let samples = self.samples();
        if samples.is_empty() {
            return Duration::ZERO;
        }
        samples.iter().sum::<Duration>() / samples.len() as u32
    }

    pub fn max(&self) -> Duration {
        self.samples().iter().copied().max().unwrap_or_default()
    }

    pub fn min(&self) -> Duration {
        self.samples().iter().copied().min().unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        if self.filled {
            self.capacity
        } else {
            self.index
        }
    }
}
