// Playback task: one worker thread per playback plus its stop signal
// Backends hand a blocking body (a Job) to the task; stop, wait and the duration cap live here

use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::Result;

/// Observable state of a handle or backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaybackState {
    Idle,
    Playing,
    Finished,
    Stopped,
    Failed,
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing)
    }
}

/// Result of a blocking wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// Playback ended (or was never running) in the given state
    Completed(PlaybackState),
    /// The timeout elapsed first; playback was stopped
    TimedOut,
}

/// Blocking playback body run on the worker thread.
///
/// The body must return once playback ends naturally or as soon as the
/// signal is raised. An `Err` becomes the `Failed` state.
pub type Job = Box<dyn FnOnce(&StopSignal) -> Result<()> + Send + 'static>;

type Hook = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct SignalState {
    stop: bool,
    capped: bool,
    hooks: Vec<Hook>,
}

impl SignalState {
    fn raised(&self) -> bool {
        self.stop || self.capped
    }
}

/// Cancellation signal shared between the task and its job.
///
/// Raised by an explicit stop, by a wait timeout, or by the duration cap.
#[derive(Default)]
pub struct StopSignal {
    state: Mutex<SignalState>,
    changed: Condvar,
}

impl StopSignal {
    #[cfg(test)]
    pub(crate) fn raised() -> Self {
        let signal = Self::default();
        signal.raise(false);
        signal
    }

    pub fn is_raised(&self) -> bool {
        self.state.lock().raised()
    }

    /// Sleep for up to `duration`, waking early when the signal is raised.
    /// Returns whether the signal is raised.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut state = self.state.lock();
        while !state.raised() {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.raised()
    }

    /// Register a callback that interrupts a blocking OS call.
    /// Runs immediately if the signal is already raised.
    pub fn on_raise(&self, hook: impl FnOnce() + Send + 'static) {
        let mut state = self.state.lock();
        if state.raised() {
            drop(state);
            hook();
            return;
        }
        state.hooks.push(Box::new(hook));
    }

    fn stop_requested(&self) -> bool {
        self.state.lock().stop
    }

    fn raise(&self, capped: bool) {
        let hooks = {
            let mut state = self.state.lock();
            let already = state.raised();
            if capped {
                state.capped = true;
            } else {
                state.stop = true;
            }
            self.changed.notify_all();
            if already {
                Vec::new()
            } else {
                std::mem::take(&mut state.hooks)
            }
        };
        for hook in hooks {
            hook();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    Finished,
    Stopped,
    Failed(String),
}

struct Control {
    label: String,
    signal: StopSignal,
    // None while the job is running
    outcome: Mutex<Option<Outcome>>,
    done: Condvar,
}

/// Cloneable view of a running (or finished) playback
#[derive(Clone)]
pub struct Playback {
    control: Arc<Control>,
}

impl Playback {
    pub fn state(&self) -> PlaybackState {
        match &*self.control.outcome.lock() {
            None => PlaybackState::Playing,
            Some(Outcome::Finished) => PlaybackState::Finished,
            Some(Outcome::Stopped) => PlaybackState::Stopped,
            Some(Outcome::Failed(_)) => PlaybackState::Failed,
        }
    }

    /// Failure message, if the playback failed
    pub fn error(&self) -> Option<String> {
        match &*self.control.outcome.lock() {
            Some(Outcome::Failed(msg)) => Some(msg.clone()),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.control.outcome.lock().is_none()
    }

    /// Ask the job to stop without waiting for it.
    /// Returns false if the playback had already ended.
    pub fn request_stop(&self) -> bool {
        // Raised under the outcome lock so the worker cannot report
        // Finished after a stop was requested
        let outcome = self.control.outcome.lock();
        if outcome.is_some() {
            return false;
        }
        tracing::debug!("stopping: {}", self.control.label);
        self.control.signal.raise(false);
        true
    }

    /// Block until the playback ends or `timeout` elapses.
    ///
    /// On timeout the playback is stopped and `TimedOut` is returned.
    pub fn wait(&self, timeout: Option<Duration>) -> WaitStatus {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut outcome = self.control.outcome.lock();
        while outcome.is_none() {
            match deadline {
                Some(deadline) => {
                    if self.control.done.wait_until(&mut outcome, deadline).timed_out()
                        && outcome.is_none()
                    {
                        drop(outcome);
                        if self.request_stop() {
                            tracing::debug!("timed out waiting for: {}", self.control.label);
                            self.wait_done();
                            return WaitStatus::TimedOut;
                        }
                        return WaitStatus::Completed(self.state());
                    }
                }
                None => self.control.done.wait(&mut outcome),
            }
        }
        drop(outcome);
        WaitStatus::Completed(self.state())
    }

    fn wait_done(&self) {
        let mut outcome = self.control.outcome.lock();
        while outcome.is_none() {
            self.control.done.wait(&mut outcome);
        }
    }

    fn expire(&self) {
        let outcome = self.control.outcome.lock();
        if outcome.is_none() {
            tracing::debug!("duration cap reached: {}", self.control.label);
            self.control.signal.raise(true);
        }
    }
}

/// Owns the worker thread (and the duration timer) of one playback
pub struct PlaybackTask {
    playback: Playback,
    worker: Option<JoinHandle<()>>,
    timer: Option<JoinHandle<()>>,
}

impl PlaybackTask {
    /// Run `job` on a new worker thread.
    ///
    /// With a `cap`, a timer raises the signal once the cap elapses; a
    /// playback truncated that way still reports `Finished`.
    pub fn spawn(label: impl Into<String>, job: Job, cap: Option<Duration>) -> Result<Self> {
        let control = Arc::new(Control {
            label: label.into(),
            signal: StopSignal::default(),
            outcome: Mutex::new(None),
            done: Condvar::new(),
        });
        let playback = Playback {
            control: Arc::clone(&control),
        };

        let worker = thread::Builder::new()
            .name("boombox-playback".to_string())
            .spawn(move || run_job(control, job))?;

        // From here on, an early return drops the task, which stops and
        // joins the worker
        let mut task = Self {
            playback,
            worker: Some(worker),
            timer: None,
        };
        if let Some(cap) = cap {
            let playback = task.playback();
            task.timer = Some(
                thread::Builder::new()
                    .name("boombox-timer".to_string())
                    .spawn(move || {
                        if let WaitStatus::TimedOut = wait_quietly(&playback, cap) {
                            playback.expire();
                        }
                    })?,
            );
        }
        Ok(task)
    }

    pub fn playback(&self) -> Playback {
        self.playback.clone()
    }

    pub fn state(&self) -> PlaybackState {
        self.playback.state()
    }

    /// Stop the playback and join its threads. Idempotent.
    pub fn stop(&mut self) {
        self.playback.request_stop();
        self.playback.wait_done();
        self.join();
    }

    fn join(&mut self) {
        for handle in [self.worker.take(), self.timer.take()].into_iter().flatten() {
            if handle.join().is_err() {
                tracing::warn!("playback thread panicked: {}", self.playback.control.label);
            }
        }
    }
}

impl Drop for PlaybackTask {
    fn drop(&mut self) {
        self.stop();
    }
}

// Like Playback::wait but never stops the playback
fn wait_quietly(playback: &Playback, timeout: Duration) -> WaitStatus {
    let deadline = Instant::now() + timeout;
    let control = &playback.control;
    let mut outcome = control.outcome.lock();
    while outcome.is_none() {
        if control.done.wait_until(&mut outcome, deadline).timed_out() && outcome.is_none() {
            return WaitStatus::TimedOut;
        }
    }
    WaitStatus::Completed(PlaybackState::Finished)
}

fn run_job(control: Arc<Control>, job: Job) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| job(&control.signal)));

    let mut outcome = control.outcome.lock();
    let stopped = control.signal.stop_requested();
    let next = match result {
        _ if stopped => Outcome::Stopped,
        Ok(Ok(())) => Outcome::Finished,
        Ok(Err(e)) => {
            tracing::error!("{}: {}", control.label, e);
            Outcome::Failed(e.to_string())
        }
        Err(_) => Outcome::Failed("playback thread panicked".to_string()),
    };
    tracing::debug!("{} ended: {:?}", control.label, next);
    *outcome = Some(next);
    control.done.notify_all();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoomboxError;

    fn sleeper(ms: u64) -> Job {
        Box::new(move |signal: &StopSignal| -> Result<()> {
            signal.sleep(Duration::from_millis(ms));
            Ok(())
        })
    }

    #[test]
    fn test_natural_completion() {
        let task = PlaybackTask::spawn("sleeper", sleeper(50), None).unwrap();
        let status = task.playback().wait(None);
        assert_eq!(status, WaitStatus::Completed(PlaybackState::Finished));
        assert_eq!(task.state(), PlaybackState::Finished);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut task = PlaybackTask::spawn("sleeper", sleeper(5_000), None).unwrap();
        assert_eq!(task.state(), PlaybackState::Playing);

        let started = Instant::now();
        task.stop();
        task.stop();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(task.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_wait_timeout_stops_playback() {
        let task = PlaybackTask::spawn("sleeper", sleeper(5_000), None).unwrap();
        let started = Instant::now();
        let status = task.playback().wait(Some(Duration::from_millis(200)));
        let elapsed = started.elapsed();

        assert_eq!(status, WaitStatus::TimedOut);
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_secs(2));
        assert_eq!(task.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_duration_cap_reports_finished() {
        let cap = Some(Duration::from_millis(100));
        let task = PlaybackTask::spawn("sleeper", sleeper(5_000), cap).unwrap();
        let started = Instant::now();
        let status = task.playback().wait(None);

        assert_eq!(status, WaitStatus::Completed(PlaybackState::Finished));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_job_error_is_captured() {
        let job: Job = Box::new(|_: &StopSignal| -> Result<()> {
            Err(BoomboxError::PlaybackFailed("device went away".to_string()))
        });
        let task = PlaybackTask::spawn("broken", job, None).unwrap();
        task.playback().wait(None);
        assert_eq!(task.state(), PlaybackState::Failed);
        assert!(task.playback().error().unwrap().contains("device went away"));
    }

    #[test]
    fn test_panicking_job_fails() {
        let job: Job = Box::new(|_: &StopSignal| -> Result<()> { panic!("boom") });
        let task = PlaybackTask::spawn("panicky", job, None).unwrap();
        assert_eq!(
            task.playback().wait(Some(Duration::from_secs(5))),
            WaitStatus::Completed(PlaybackState::Failed)
        );
    }

    #[test]
    fn test_stop_wins_over_completion() {
        // The job ignores the signal and finishes on its own; the stop
        // was requested first, so it must be reported
        let job: Job = Box::new(|_: &StopSignal| -> Result<()> {
            thread::sleep(Duration::from_millis(100));
            Ok(())
        });
        let mut task = PlaybackTask::spawn("stubborn", job, None).unwrap();
        task.stop();
        assert_eq!(task.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_hooks_run_on_raise() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let fired = Arc::new(AtomicBool::new(false));
        let seen = Arc::clone(&fired);
        let job: Job = Box::new(move |signal: &StopSignal| -> Result<()> {
            let seen = Arc::clone(&seen);
            signal.on_raise(move || seen.store(true, Ordering::SeqCst));
            signal.sleep(Duration::from_secs(5));
            Ok(())
        });
        let mut task = PlaybackTask::spawn("hooked", job, None).unwrap();
        thread::sleep(Duration::from_millis(50));
        task.stop();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_dropped_task_releases_worker() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let released = Arc::new(AtomicBool::new(false));
        let seen = Arc::clone(&released);
        let job: Job = Box::new(move |signal: &StopSignal| -> Result<()> {
            if signal.sleep(Duration::from_secs(5)) {
                seen.store(true, Ordering::SeqCst);
            }
            Ok(())
        });
        let task = PlaybackTask::spawn("dropped", job, None).unwrap();
        let playback = task.playback();

        let started = Instant::now();
        drop(task);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(released.load(Ordering::SeqCst));
        assert_eq!(playback.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_raised_signal() {
        let signal = StopSignal::raised();
        assert!(signal.is_raised());
        assert!(signal.sleep(Duration::from_secs(5)));
    }
}
