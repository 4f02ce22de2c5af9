//! Run completion tracking.
//!
//! The total amount of work is unknown when a run starts: search jobs
//! discover places, places discover websites. The [`ExitMonitor`] keeps two
//! counters, `expected` and `completed`, and cancels the run as soon as
//! they meet. Producers must call [`ExitMonitor::incr_expected`] for every
//! child job before the parent's [`ExitMonitor::incr_completed`], otherwise
//! the counters could meet while work is still pending.
//!
//! A background inactivity timer ([`ExitMonitor::run`]) is the safety net
//! for work that silently stalls outside of job-level timeouts.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every known job finished.
    Completed,
    /// No counter changed for the configured inactivity window.
    Inactivity,
}

/// Point-in-time view of the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub state: MonitorState,
    pub expected: usize,
    pub completed: usize,
    pub stop_reason: Option<StopReason>,
}

#[derive(Debug)]
struct Counters {
    state: MonitorState,
    expected: usize,
    completed: usize,
    stop_reason: Option<StopReason>,
}

#[derive(Debug)]
pub struct ExitMonitor {
    counters: Mutex<Counters>,
    activity: Notify,
    cancel: CancellationToken,
    inactivity: Option<Duration>,
}

impl ExitMonitor {
    /// `cancel` is the run's token; it is cancelled when the monitor stops.
    /// `inactivity` of `None` disables the inactivity timer.
    pub fn new(cancel: CancellationToken, inactivity: Option<Duration>) -> Self {
        Self {
            counters: Mutex::new(Counters {
                state: MonitorState::Idle,
                expected: 0,
                completed: 0,
                stop_reason: None,
            }),
            activity: Notify::new(),
            cancel,
            inactivity,
        }
    }

    /// Register the seed jobs and start tracking.
    ///
    /// A seed count of zero stops the run immediately.
    pub fn set_seed_count(&self, seeds: usize) {
        let mut counters = self.lock();
        if counters.state != MonitorState::Idle {
            warn!(state = ?counters.state, "Seed count registered twice, ignoring");
            return;
        }

        counters.expected += seeds;
        counters.state = MonitorState::Running;
        info!(seeds, "Exit monitor running");
        self.activity.notify_one();

        if counters.completed >= counters.expected {
            self.stop_locked(&mut counters, StopReason::Completed);
        }
    }

    /// Register `n` newly emitted jobs.
    pub fn incr_expected(&self, n: usize) {
        if n == 0 {
            return;
        }

        let mut counters = self.lock();
        if counters.state == MonitorState::Stopped {
            debug!(n, "Jobs registered after stop, ignoring");
            return;
        }

        counters.expected += n;
        self.activity.notify_one();
    }

    /// Record `n` finished jobs, successful or failed.
    pub fn incr_completed(&self, n: usize) {
        if n == 0 {
            return;
        }

        let mut counters = self.lock();
        if counters.state == MonitorState::Stopped {
            return;
        }

        counters.completed += n;
        if counters.completed > counters.expected {
            warn!(
                completed = counters.completed,
                expected = counters.expected,
                "Completion recorded for unregistered job"
            );
            counters.completed = counters.expected;
        }
        self.activity.notify_one();

        debug!(
            completed = counters.completed,
            expected = counters.expected,
            "Job completed"
        );

        if counters.state == MonitorState::Running && counters.completed == counters.expected {
            self.stop_locked(&mut counters, StopReason::Completed);
        }
    }

    pub fn progress(&self) -> Progress {
        let counters = self.lock();
        Progress {
            state: counters.state,
            expected: counters.expected,
            completed: counters.completed,
            stop_reason: counters.stop_reason,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.lock().state == MonitorState::Stopped
    }

    /// Drive the inactivity timer until the run is cancelled.
    ///
    /// Every counter mutation restarts the window.
    pub async fn run(&self) {
        let Some(window) = self.inactivity else {
            self.cancel.cancelled().await;
            return;
        };

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = self.activity.notified() => continue,
                _ = tokio::time::sleep(window) => {
                    let mut counters = self.lock();
                    warn!(
                        window = ?window,
                        completed = counters.completed,
                        expected = counters.expected,
                        "No progress within inactivity window"
                    );
                    self.stop_locked(&mut counters, StopReason::Inactivity);
                    return;
                }
            }
        }
    }

    fn stop_locked(&self, counters: &mut Counters, reason: StopReason) {
        if counters.state == MonitorState::Stopped {
            return;
        }

        counters.state = MonitorState::Stopped;
        counters.stop_reason = Some(reason);
        info!(
            ?reason,
            completed = counters.completed,
            expected = counters.expected,
            "Exit monitor stopping run"
        );
        self.cancel.cancel();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn monitor(inactivity: Option<Duration>) -> (Arc<ExitMonitor>, CancellationToken) {
        let token = CancellationToken::new();
        (Arc::new(ExitMonitor::new(token.clone(), inactivity)), token)
    }

    #[test]
    fn test_zero_seeds_stop_immediately() {
        let (monitor, token) = monitor(None);
        monitor.set_seed_count(0);

        assert!(token.is_cancelled());
        let progress = monitor.progress();
        assert_eq!(progress.state, MonitorState::Stopped);
        assert_eq!(progress.stop_reason, Some(StopReason::Completed));
        assert_eq!(progress.expected, 0);
    }

    #[test]
    fn test_idle_until_seeded() {
        let (monitor, token) = monitor(None);
        assert_eq!(monitor.progress().state, MonitorState::Idle);
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_stops_when_discovered_work_is_done() {
        let (monitor, token) = monitor(None);
        monitor.set_seed_count(1);

        // search emits two places before completing
        monitor.incr_expected(2);
        monitor.incr_completed(1);
        assert!(!token.is_cancelled());

        // first place emits an email job
        monitor.incr_expected(1);
        monitor.incr_completed(1);
        monitor.incr_completed(1);
        assert!(!token.is_cancelled());

        monitor.incr_completed(1);
        assert!(token.is_cancelled());

        let progress = monitor.progress();
        assert_eq!(progress.expected, 4);
        assert_eq!(progress.completed, 4);
    }

    #[test]
    fn test_events_after_stop_are_ignored() {
        let (monitor, _token) = monitor(None);
        monitor.set_seed_count(1);
        monitor.incr_completed(1);

        monitor.incr_expected(5);
        monitor.incr_completed(2);
        let progress = monitor.progress();
        assert_eq!(progress.expected, 1);
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.stop_reason, Some(StopReason::Completed));
    }

    #[test]
    fn test_completion_never_exceeds_expected() {
        let (monitor, _token) = monitor(None);
        monitor.set_seed_count(2);
        monitor.incr_completed(5);
        let progress = monitor.progress();
        assert_eq!(progress.completed, 2);
        assert_eq!(progress.state, MonitorState::Stopped);
    }

    #[test]
    fn test_registration_before_completion_under_concurrency() {
        const WORKERS: usize = 4;
        const MAX_DEPTH: usize = 6;

        let (monitor, token) = monitor(None);
        monitor.set_seed_count(WORKERS);

        let done = Arc::new(AtomicBool::new(false));
        let observer = {
            let monitor = monitor.clone();
            let done = done.clone();
            std::thread::spawn(move || {
                let mut samples = 0usize;
                while !done.load(Ordering::Acquire) {
                    let p = monitor.progress();
                    assert!(p.completed <= p.expected, "{:?}", p);
                    samples += 1;
                }
                samples
            })
        };

        let workers: Vec<_> = (0..WORKERS)
            .map(|_| {
                let monitor = monitor.clone();
                std::thread::spawn(move || {
                    let mut stack = vec![0usize];
                    while let Some(depth) = stack.pop() {
                        let children = if depth < MAX_DEPTH { 2 } else { 0 };
                        monitor.incr_expected(children);
                        stack.extend(std::iter::repeat(depth + 1).take(children));
                        monitor.incr_completed(1);
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }
        done.store(true, Ordering::Release);
        assert!(observer.join().unwrap() > 0);

        let per_tree = (1usize << (MAX_DEPTH + 1)) - 1;
        let progress = monitor.progress();
        assert!(token.is_cancelled());
        assert_eq!(progress.state, MonitorState::Stopped);
        assert_eq!(progress.stop_reason, Some(StopReason::Completed));
        assert_eq!(progress.expected, WORKERS * per_tree);
        assert_eq!(progress.completed, progress.expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactivity_stops_run() {
        let (monitor, token) = monitor(Some(Duration::from_secs(60)));
        monitor.set_seed_count(3);
        monitor.incr_completed(1);

        let handle = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.run().await })
        };

        tokio::time::sleep(Duration::from_secs(30)).await;
        monitor.incr_completed(1);
        tokio::time::sleep(Duration::from_secs(45)).await;
        assert!(!token.is_cancelled(), "activity should restart the window");

        tokio::time::sleep(Duration::from_secs(30)).await;
        handle.await.unwrap();
        assert!(token.is_cancelled());
        assert_eq!(monitor.progress().stop_reason, Some(StopReason::Inactivity));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_returns_on_completion() {
        let (monitor, _token) = monitor(Some(Duration::from_secs(60)));
        monitor.set_seed_count(1);

        let handle = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.run().await })
        };
        monitor.incr_completed(1);

        handle.await.unwrap();
        assert_eq!(monitor.progress().stop_reason, Some(StopReason::Completed));
    }
}
