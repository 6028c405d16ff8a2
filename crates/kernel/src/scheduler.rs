use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::Mutex;

use crate::KernelError;
use crate::clock::Clock;

/// Single-slot signal handed from one thread to another once per cycle.
///
/// Backed by a one-element channel: a release with the slot already full is
/// a no-op, so the signal behaves like a binary semaphore.
#[derive(Debug, Clone)]
pub struct Handoff {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl Handoff {
    pub fn new(released: bool) -> Self {
        let (tx, rx) = bounded(1);
        if released {
            let _ = tx.try_send(());
        }
        Self { tx, rx }
    }

    /// Signal the other side. Returns `false` if the signal was already pending.
    pub fn release(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }

    /// Block until signalled.
    pub fn acquire(&self) {
        // Both ends live in `self`, so the channel cannot disconnect.
        let _ = self.rx.recv();
    }

    /// Take the signal if it is pending, without blocking.
    pub fn try_acquire(&self) -> bool {
        self.rx.try_recv().is_ok()
    }
}

/// The two worker roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Simulation,
    Presentation,
}

impl Role {
    pub fn name(self) -> &'static str {
        match self {
            Role::Simulation => "simulation",
            Role::Presentation => "presentation",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of asking the scheduler to start a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Started,
    /// The previous run of this role has not finished; nothing was queued.
    Skipped,
}

/// Per-role counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleStats {
    pub dispatched: u64,
    pub skipped: u64,
    pub completed: u64,
    pub soft_overruns: u64,
    pub in_flight: usize,
    pub peak_in_flight: usize,
}

#[derive(Debug, Default)]
struct RoleCounters {
    dispatched: AtomicU64,
    skipped: AtomicU64,
    completed: AtomicU64,
    soft_overruns: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl RoleCounters {
    fn snapshot(&self) -> RoleStats {
        RoleStats {
            dispatched: self.dispatched.load(Ordering::Acquire),
            skipped: self.skipped.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Acquire),
            soft_overruns: self.soft_overruns.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            peak_in_flight: self.peak_in_flight.load(Ordering::Relaxed),
        }
    }
}

/// A unit of work run once per dispatch on a worker thread.
pub type Job = Box<dyn FnMut() -> Result<(), KernelError> + Send>;

struct Worker {
    role: Role,
    run: Handoff,
    done: Handoff,
    counters: Arc<RoleCounters>,
    thread: Option<JoinHandle<()>>,
}

#[derive(Debug, Clone)]
struct Fault {
    role: Role,
    message: String,
}

/// Runs simulation and presentation on two long-lived threads at independent
/// cadences, with at most one run of each role in flight.
///
/// The control thread never blocks here: a request whose previous run is
/// still going is skipped, not queued.
pub struct Scheduler {
    clock: Arc<Clock>,
    simulation: Worker,
    presentation: Worker,
    stop: Arc<AtomicBool>,
    fault: Arc<Mutex<Option<Fault>>>,
}

impl Scheduler {
    /// Spawn both workers. Each parks until its first dispatch.
    pub fn spawn(
        clock: Arc<Clock>,
        simulation: Job,
        presentation: Job,
    ) -> Result<Self, KernelError> {
        let stop = Arc::new(AtomicBool::new(false));
        let fault = Arc::new(Mutex::new(None));

        let simulation = Worker::spawn(Role::Simulation, simulation, &stop, &fault)?;
        let presentation = match Worker::spawn(Role::Presentation, presentation, &stop, &fault) {
            Ok(worker) => worker,
            Err(err) => {
                stop.store(true, Ordering::Release);
                let mut simulation = simulation;
                simulation.run.release();
                let _ = simulation.join();
                return Err(err);
            }
        };

        tracing::info!("scheduler started");
        Ok(Self {
            clock,
            simulation,
            presentation,
            stop,
            fault,
        })
    }

    /// Start a simulation run if the previous one has completed.
    ///
    /// `prepare` runs on the calling thread after the worker is known to be
    /// idle and before it is released. A tick dispatched more than two tick
    /// intervals after the previous one counts as a soft overrun, whether the
    /// previous run or the caller was slow.
    pub fn request_tick(&self, prepare: impl FnOnce()) -> Dispatch {
        if !self.simulation.dispatch(&self.stop, prepare) {
            return Dispatch::Skipped;
        }
        let counters = &self.simulation.counters;
        let since_last = self.clock.since_last_tick();
        let interval = self.clock.tick_interval();
        if counters.dispatched.load(Ordering::Acquire) > 1 && since_last > interval * 2 {
            counters.soft_overruns.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                since_last_ms = since_last.as_secs_f64() * 1000.0,
                interval_ms = interval.as_secs_f64() * 1000.0,
                "tick thread ran slow"
            );
        }
        self.clock.mark_tick();
        Dispatch::Started
    }

    /// Start a presentation run if the previous one has completed.
    pub fn request_frame(&self, prepare: impl FnOnce()) -> Dispatch {
        if self.presentation.dispatch(&self.stop, prepare) {
            Dispatch::Started
        } else {
            Dispatch::Skipped
        }
    }

    pub fn stats(&self, role: Role) -> RoleStats {
        match role {
            Role::Simulation => self.simulation.counters.snapshot(),
            Role::Presentation => self.presentation.counters.snapshot(),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// The first error a worker returned, if any. A faulted scheduler stops
    /// dispatching.
    pub fn fault(&self) -> Option<KernelError> {
        self.fault
            .lock()
            .as_ref()
            .map(|fault| KernelError::WorkerFault {
                role: fault.role,
                message: fault.message.clone(),
            })
    }

    /// Stop both workers and join them. Safe to call more than once.
    ///
    /// A worker can only be parked waiting for its next run, never mid-run,
    /// so one release each is enough to wake it.
    pub fn shutdown(&mut self) -> Result<(), KernelError> {
        if self.simulation.thread.is_none() && self.presentation.thread.is_none() {
            return Ok(());
        }
        tracing::info!("scheduler shutting down");
        self.stop.store(true, Ordering::Release);
        self.simulation.run.release();
        self.presentation.run.release();

        let simulation = self.simulation.join();
        let presentation = self.presentation.join();
        tracing::info!("scheduler workers joined");
        simulation.and(presentation)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            tracing::error!(%err, "scheduler shutdown failed");
        }
    }
}

impl Worker {
    fn spawn(
        role: Role,
        mut job: Job,
        stop: &Arc<AtomicBool>,
        fault: &Arc<Mutex<Option<Fault>>>,
    ) -> Result<Self, KernelError> {
        let run = Handoff::new(false);
        let done = Handoff::new(true);
        let counters = Arc::new(RoleCounters::default());

        let thread = {
            let run = run.clone();
            let done = done.clone();
            let counters = Arc::clone(&counters);
            let stop = Arc::clone(stop);
            let fault = Arc::clone(fault);
            thread::Builder::new()
                .name(role.name().to_string())
                .spawn(move || {
                    tracing::info!(role = role.name(), "worker started");
                    while !stop.load(Ordering::Acquire) {
                        run.acquire();
                        if stop.load(Ordering::Acquire) {
                            break;
                        }

                        let in_flight = counters.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
                        counters
                            .peak_in_flight
                            .fetch_max(in_flight, Ordering::AcqRel);
                        let started = Instant::now();
                        let result = job();
                        counters.in_flight.fetch_sub(1, Ordering::AcqRel);
                        tracing::trace!(
                            role = role.name(),
                            elapsed_us = started.elapsed().as_micros() as u64,
                            "run complete"
                        );

                        if let Err(err) = result {
                            tracing::error!(role = role.name(), %err, "worker run failed");
                            fault.lock().get_or_insert(Fault {
                                role,
                                message: err.to_string(),
                            });
                            stop.store(true, Ordering::Release);
                        }
                        counters.completed.fetch_add(1, Ordering::Release);
                        done.release();
                    }
                    tracing::info!(role = role.name(), "worker exiting");
                })
                .map_err(|source| KernelError::Spawn { role, source })?
        };

        Ok(Self {
            role,
            run,
            done,
            counters,
            thread: Some(thread),
        })
    }

    fn dispatch(&self, stop: &AtomicBool, prepare: impl FnOnce()) -> bool {
        if stop.load(Ordering::Acquire) || !self.done.try_acquire() {
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        prepare();
        self.counters.dispatched.fetch_add(1, Ordering::Release);
        self.run.release();
        true
    }

    fn join(&mut self) -> Result<(), KernelError> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        thread.join().map_err(|_| {
            tracing::error!(role = self.role.name(), "worker panicked");
            KernelError::WorkerPanicked(self.role)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meander_render::RenderError;
    use std::sync::atomic::AtomicI64;
    use std::time::Duration;

    fn idle() -> Job {
        Box::new(|| Ok(()))
    }

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !condition() {
            assert!(Instant::now() < deadline, "condition never became true");
            thread::yield_now();
        }
    }

    #[test]
    fn handoff_is_binary() {
        let handoff = Handoff::new(false);
        assert!(!handoff.try_acquire());
        assert!(handoff.release());
        assert!(!handoff.release());
        assert!(handoff.try_acquire());
        assert!(!handoff.try_acquire());

        let released = Handoff::new(true);
        assert!(released.try_acquire());
    }

    #[test]
    fn roles_never_overlap_themselves() {
        let clock = Arc::new(Clock::new(1e6, 1e6));
        let active = Arc::new([AtomicI64::new(0), AtomicI64::new(0)]);
        let violations = Arc::new(AtomicU64::new(0));

        let job = |slot: usize| -> Job {
            let active = Arc::clone(&active);
            let violations = Arc::clone(&violations);
            Box::new(move || {
                if active[slot].fetch_add(1, Ordering::SeqCst) != 0 {
                    violations.fetch_add(1, Ordering::SeqCst);
                }
                thread::yield_now();
                active[slot].fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
        };

        let mut scheduler = Scheduler::spawn(Arc::clone(&clock), job(0), job(1)).unwrap();
        for _ in 0..20_000 {
            scheduler.request_tick(|| {});
            scheduler.request_frame(|| {});
            for role in [Role::Simulation, Role::Presentation] {
                let stats = scheduler.stats(role);
                assert!(stats.dispatched - stats.completed <= 1);
            }
        }
        scheduler.shutdown().unwrap();

        assert_eq!(violations.load(Ordering::SeqCst), 0);
        for role in [Role::Simulation, Role::Presentation] {
            let stats = scheduler.stats(role);
            assert!(stats.dispatched > 0);
            assert_eq!(stats.peak_in_flight, 1);
            assert_eq!(stats.dispatched + stats.skipped, 20_000);
        }
    }

    #[test]
    fn busy_role_is_skipped_without_blocking() {
        let clock = Arc::new(Clock::new(60.0, 60.0));
        let (gate_tx, gate_rx) = bounded::<()>(0);
        let blocking: Job = Box::new(move || {
            let _ = gate_rx.recv();
            Ok(())
        });

        let mut scheduler = Scheduler::spawn(clock, blocking, idle()).unwrap();
        assert_eq!(scheduler.request_tick(|| {}), Dispatch::Started);
        wait_for(|| scheduler.stats(Role::Simulation).in_flight == 1);

        let mut prepared = false;
        assert_eq!(scheduler.request_tick(|| prepared = true), Dispatch::Skipped);
        assert!(!prepared);
        // Presentation is independent of the stuck simulation run.
        assert_eq!(scheduler.request_frame(|| {}), Dispatch::Started);

        gate_tx.send(()).unwrap();
        wait_for(|| scheduler.stats(Role::Simulation).completed == 1);
        assert_eq!(scheduler.request_tick(|| {}), Dispatch::Started);
        gate_tx.send(()).unwrap();
        scheduler.shutdown().unwrap();

        let stats = scheduler.stats(Role::Simulation);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.completed, 2);
    }

    #[test]
    fn slow_tick_counts_one_soft_overrun() {
        let clock = Arc::new(Clock::new(100.0, 1.0));
        let runs = Arc::new(AtomicU64::new(0));
        let slow_once: Job = {
            let runs = Arc::clone(&runs);
            Box::new(move || {
                if runs.fetch_add(1, Ordering::SeqCst) == 0 {
                    thread::sleep(Duration::from_millis(50));
                }
                Ok(())
            })
        };

        let mut scheduler = Scheduler::spawn(Arc::clone(&clock), slow_once, idle()).unwrap();
        let mut due_checks_while_busy = 0;
        while scheduler.stats(Role::Simulation).completed < 4 {
            if clock.tick_due() {
                if scheduler.request_tick(|| {}) == Dispatch::Skipped {
                    due_checks_while_busy += 1;
                }
            } else {
                thread::yield_now();
            }
        }
        assert_eq!(scheduler.stats(Role::Simulation).soft_overruns, 1);
        assert!(due_checks_while_busy > 0);

        // A stalled caller makes the next tick late even though every run is fast.
        thread::sleep(Duration::from_millis(60));
        assert!(clock.since_last_tick() > clock.tick_interval() * 2);
        assert_eq!(scheduler.request_tick(|| {}), Dispatch::Started);
        scheduler.shutdown().unwrap();

        assert_eq!(scheduler.stats(Role::Simulation).soft_overruns, 2);
    }

    #[test]
    fn shutdown_wakes_parked_workers() {
        let clock = Arc::new(Clock::new(60.0, 60.0));
        let mut scheduler = Scheduler::spawn(clock, idle(), idle()).unwrap();
        scheduler.shutdown().unwrap();
        assert!(scheduler.is_stopped());
        // Second call is a no-op.
        scheduler.shutdown().unwrap();
        assert_eq!(scheduler.request_tick(|| {}), Dispatch::Skipped);
    }

    #[test]
    fn worker_error_becomes_fault() {
        let clock = Arc::new(Clock::new(60.0, 60.0));
        let failing: Job = Box::new(|| Err(RenderError::NoPipelineBound.into()));
        let mut scheduler = Scheduler::spawn(clock, idle(), failing).unwrap();

        assert_eq!(scheduler.request_frame(|| {}), Dispatch::Started);
        wait_for(|| scheduler.is_stopped());
        let fault = scheduler.fault();
        assert!(matches!(
            fault,
            Some(KernelError::WorkerFault {
                role: Role::Presentation,
                ..
            })
        ));
        assert_eq!(scheduler.request_frame(|| {}), Dispatch::Skipped);
        scheduler.shutdown().unwrap();
    }
}
