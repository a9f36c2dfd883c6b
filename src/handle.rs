// Playback handle
// Binds one request to one backend and exposes play / stop / wait

use parking_lot::Mutex;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::audio::{select_backend, Backend, BackendKind, Playback, PlaybackState, WaitStatus};
use crate::error::{BoomboxError, Result};
use crate::options::{PlayOption, PlayOptions};
use crate::request::PlaybackRequest;

struct Inner {
    backend: Box<dyn Backend>,
    // Set when the last play() resolved without reaching the backend
    settled: Option<PlaybackState>,
    failure: Option<String>,
    last_wait: Option<WaitStatus>,
    // Bumped by every play(), so a wait that outlived its playback can't
    // overwrite the status of a newer one
    generation: u64,
}

/// A playable sound bound to a backend.
///
/// The handle can be shared between threads: `stop` from one thread ends a
/// blocking `play` in another. Dropping the handle stops its playback.
pub struct Handle {
    request: PlaybackRequest,
    options: PlayOptions,
    kind: BackendKind,
    inner: Mutex<Inner>,
}

impl Handle {
    /// Bind `request` to the first usable backend for this platform
    pub fn new(request: PlaybackRequest, options: PlayOptions) -> Result<Self> {
        let backend = select_backend(&options)?;
        Self::with_backend(request, backend, options)
    }

    /// Bind `request` to a specific backend
    pub fn with_backend(
        request: PlaybackRequest,
        backend: Box<dyn Backend>,
        options: PlayOptions,
    ) -> Result<Self> {
        backend.ready(&options)?;
        let kind = backend.kind();
        tracing::debug!("new handle on {}: {}", kind, request);
        Ok(Self {
            request,
            options,
            kind,
            inner: Mutex::new(Inner {
                backend,
                settled: None,
                failure: None,
                last_wait: None,
                generation: 0,
            }),
        })
    }

    /// Verify a file and bind it to the default backend
    pub fn open(path: impl AsRef<Path>, options: PlayOptions) -> Result<Self> {
        Self::new(PlaybackRequest::file(path)?, options)
    }

    /// Start playback, replacing any playback this handle already started.
    ///
    /// With `wait` set this blocks until playback ends or `timeout_ms`
    /// elapses. Errors are returned for requests the backend can't start;
    /// failures during playback show up in [`Handle::state`].
    pub fn play(&self) -> Result<&Self> {
        let (playback, generation) = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            inner.backend.stop();
            inner.settled = None;
            inner.failure = None;
            inner.last_wait = None;

            if self.request.is_empty() {
                tracing::debug!("nothing to play: {}", self.request);
                inner.settled = Some(PlaybackState::Finished);
                if self.options.wait {
                    inner.last_wait = Some(WaitStatus::Completed(PlaybackState::Finished));
                }
                return Ok(self);
            }

            match inner.backend.launch(&self.request, &self.options) {
                Ok(playback) => (playback, inner.generation),
                Err(e) => {
                    tracing::warn!("{} failed to start {}: {}", self.kind, self.request, e);
                    inner.settled = Some(PlaybackState::Failed);
                    inner.failure = Some(e.to_string());
                    return Err(e);
                }
            }
        };

        // Block without the lock so stop() stays available to other threads
        if self.options.wait {
            let status = playback.wait(self.options.timeout());
            let mut inner = self.inner.lock();
            if inner.generation == generation {
                inner.last_wait = Some(status);
            }
        }
        Ok(self)
    }

    /// Stop playback. Safe to call at any time, any number of times.
    pub fn stop(&self) {
        self.inner.lock().backend.stop();
    }

    /// Block until playback ends or `timeout` elapses (then stop it)
    pub fn wait(&self, timeout: Option<Duration>) -> WaitStatus {
        match self.active() {
            Some(playback) => playback.wait(timeout),
            None => WaitStatus::Completed(self.state()),
        }
    }

    /// [`Handle::wait`] without blocking the async runtime
    pub async fn wait_async(&self, timeout: Option<Duration>) -> Result<WaitStatus> {
        let Some(playback) = self.active() else {
            return Ok(WaitStatus::Completed(self.state()));
        };

        tokio::task::spawn_blocking(move || playback.wait(timeout))
            .await
            .map_err(|e| BoomboxError::PlaybackFailed(format!("Task join error: {}", e)))
    }

    pub fn state(&self) -> PlaybackState {
        let inner = self.inner.lock();
        inner.settled.unwrap_or_else(|| inner.backend.state())
    }

    pub fn is_playing(&self) -> bool {
        self.state().is_playing()
    }

    /// Outcome of the blocking wait done by the last `play`, if any
    pub fn last_wait(&self) -> Option<WaitStatus> {
        self.inner.lock().last_wait
    }

    /// Whether the last blocking `play` ran into its timeout
    pub fn timed_out(&self) -> bool {
        self.last_wait() == Some(WaitStatus::TimedOut)
    }

    /// Why the last playback failed
    pub fn error(&self) -> Option<String> {
        let inner = self.inner.lock();
        inner
            .failure
            .clone()
            .or_else(|| inner.backend.playback().and_then(|p| p.error()))
    }

    /// Whether the bound backend honors `option`
    pub fn supports(&self, option: PlayOption) -> bool {
        self.inner.lock().backend.supports(option)
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.kind
    }

    pub fn request(&self) -> &PlaybackRequest {
        &self.request
    }

    pub fn options(&self) -> &PlayOptions {
        &self.options
    }

    fn active(&self) -> Option<Playback> {
        let inner = self.inner.lock();
        if inner.settled.is_some() {
            return None;
        }
        inner.backend.playback()
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("request", &self.request)
            .field("backend", &self.kind)
            .field("options", &self.options)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::task::{Job, PlaybackTask, StopSignal};
    use crate::tone::synthesize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    /// Plays nothing for `play_ms`, honoring the stop signal
    struct FakeBackend {
        task: Option<PlaybackTask>,
        launches: Arc<AtomicUsize>,
        play_ms: u64,
        reject: bool,
    }

    impl FakeBackend {
        fn boxed(play_ms: u64) -> (Box<dyn Backend>, Arc<AtomicUsize>) {
            let launches = Arc::new(AtomicUsize::new(0));
            let backend = Self {
                task: None,
                launches: Arc::clone(&launches),
                play_ms,
                reject: false,
            };
            (Box::new(backend), launches)
        }

        fn rejecting() -> Box<dyn Backend> {
            Box::new(Self {
                task: None,
                launches: Arc::new(AtomicUsize::new(0)),
                play_ms: 0,
                reject: true,
            })
        }
    }

    impl Backend for FakeBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Process
        }

        fn supports(&self, option: PlayOption) -> bool {
            option != PlayOption::Volume
        }

        fn check(&self, request: &PlaybackRequest) -> Result<()> {
            if self.reject {
                return Err(BoomboxError::UnsupportedFormat {
                    backend: "fake",
                    format: "anything".to_string(),
                    source_desc: request.to_string(),
                });
            }
            Ok(())
        }

        fn prepare(&self, _request: &PlaybackRequest, _options: &PlayOptions) -> Result<Job> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            let play_ms = self.play_ms;
            Ok(Box::new(move |signal: &StopSignal| -> Result<()> {
                signal.sleep(Duration::from_millis(play_ms));
                Ok(())
            }))
        }

        fn task_slot(&self) -> &Option<PlaybackTask> {
            &self.task
        }

        fn task_slot_mut(&mut self) -> &mut Option<PlaybackTask> {
            &mut self.task
        }
    }

    fn beep() -> PlaybackRequest {
        PlaybackRequest::tone(synthesize(440.0, 100, 0.1))
    }

    #[test]
    fn test_blocking_play_finishes() {
        let (backend, launches) = FakeBackend::boxed(50);
        let handle = Handle::with_backend(beep(), backend, PlayOptions::new().wait(true)).unwrap();

        assert_eq!(handle.state(), PlaybackState::Idle);
        handle.play().unwrap();
        assert_eq!(handle.state(), PlaybackState::Finished);
        assert_eq!(handle.last_wait(), Some(WaitStatus::Completed(PlaybackState::Finished)));
        assert!(!handle.timed_out());
        assert_eq!(launches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_timeout_stops_playback() {
        let (backend, _) = FakeBackend::boxed(5_000);
        let options = PlayOptions::new().wait(true).timeout_ms(200);
        let handle = Handle::with_backend(beep(), backend, options).unwrap();

        let started = Instant::now();
        handle.play().unwrap();
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_secs(3));
        assert!(handle.timed_out());
        assert_eq!(handle.state(), PlaybackState::Stopped);

        // Nothing left to stop
        handle.stop();
        assert_eq!(handle.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_duration_cap_finishes() {
        let (backend, _) = FakeBackend::boxed(5_000);
        let options = PlayOptions::new().wait(true).duration_ms(100);
        let handle = Handle::with_backend(beep(), backend, options).unwrap();

        let started = Instant::now();
        handle.play().unwrap();
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(handle.state(), PlaybackState::Finished);
    }

    #[test]
    fn test_replay_replaces_previous() {
        let (backend, launches) = FakeBackend::boxed(5_000);
        let handle = Handle::with_backend(beep(), backend, PlayOptions::new()).unwrap();

        handle.play().unwrap();
        let first = handle.active().unwrap();
        handle.play().unwrap();

        assert_eq!(launches.load(Ordering::SeqCst), 2);
        assert_eq!(first.state(), PlaybackState::Stopped);
        assert_eq!(handle.state(), PlaybackState::Playing);

        handle.stop();
        assert_eq!(handle.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_stop_before_play_and_twice() {
        let (backend, _) = FakeBackend::boxed(5_000);
        let handle = Handle::with_backend(beep(), backend, PlayOptions::new()).unwrap();

        handle.stop();
        assert_eq!(handle.state(), PlaybackState::Idle);

        handle.play().unwrap();
        handle.stop();
        handle.stop();
        assert_eq!(handle.state(), PlaybackState::Stopped);
        assert_eq!(handle.wait(None), WaitStatus::Completed(PlaybackState::Stopped));
    }

    #[test]
    fn test_empty_tone_finishes_immediately() {
        let (backend, launches) = FakeBackend::boxed(5_000);
        let request = PlaybackRequest::tone(synthesize(440.0, 0, 0.1));
        let handle = Handle::with_backend(request, backend, PlayOptions::new().wait(true)).unwrap();

        handle.play().unwrap();
        assert_eq!(handle.state(), PlaybackState::Finished);
        assert_eq!(handle.last_wait(), Some(WaitStatus::Completed(PlaybackState::Finished)));
        assert_eq!(launches.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_rejected_request_fails_at_play() {
        let handle =
            Handle::with_backend(beep(), FakeBackend::rejecting(), PlayOptions::new()).unwrap();

        let err = handle.play().err().unwrap();
        assert!(err.is_unsupported_format());
        assert_eq!(handle.state(), PlaybackState::Failed);
        assert!(handle.error().unwrap().contains("fake"));
    }

    #[test]
    fn test_stop_from_another_thread() {
        let (backend, _) = FakeBackend::boxed(5_000);
        let handle =
            Arc::new(Handle::with_backend(beep(), backend, PlayOptions::new().wait(true)).unwrap());

        let player = {
            let handle = Arc::clone(&handle);
            thread::spawn(move || {
                handle.play().unwrap();
            })
        };

        // Wait for playback to start before stopping it
        let started = Instant::now();
        while !handle.is_playing() && started.elapsed() < Duration::from_secs(2) {
            thread::sleep(Duration::from_millis(5));
        }
        handle.stop();
        player.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(handle.state(), PlaybackState::Stopped);
        assert_eq!(handle.last_wait(), Some(WaitStatus::Completed(PlaybackState::Stopped)));
    }

    #[test]
    fn test_replaced_wait_keeps_newer_status() {
        let (backend, launches) = FakeBackend::boxed(5_000);
        let options = PlayOptions::new().wait(true).timeout_ms(1_500);
        let handle = Arc::new(Handle::with_backend(beep(), backend, options).unwrap());

        let first = {
            let handle = Arc::clone(&handle);
            thread::spawn(move || {
                handle.play().unwrap();
            })
        };
        let started = Instant::now();
        while !handle.is_playing() && started.elapsed() < Duration::from_secs(2) {
            thread::sleep(Duration::from_millis(5));
        }

        // Replacing the playback ends the first wait with Stopped
        let second = {
            let handle = Arc::clone(&handle);
            thread::spawn(move || {
                handle.play().unwrap();
            })
        };
        first.join().unwrap();
        assert_eq!(handle.last_wait(), None);
        assert!(handle.is_playing());

        second.join().unwrap();
        assert_eq!(launches.load(Ordering::SeqCst), 2);
        assert_eq!(handle.last_wait(), Some(WaitStatus::TimedOut));
        assert!(handle.timed_out());
        assert_eq!(handle.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_supports_follows_backend() {
        let (backend, _) = FakeBackend::boxed(0);
        let handle = Handle::with_backend(beep(), backend, PlayOptions::new()).unwrap();
        assert!(handle.supports(PlayOption::BinaryPath));
        assert!(!handle.supports(PlayOption::Volume));
        assert_eq!(handle.backend_kind(), BackendKind::Process);
    }

    #[tokio::test]
    async fn test_wait_async() {
        let (backend, _) = FakeBackend::boxed(50);
        let handle = Handle::with_backend(beep(), backend, PlayOptions::new()).unwrap();
        handle.play().unwrap();

        let status = handle.wait_async(Some(Duration::from_secs(5))).await.unwrap();
        assert_eq!(status, WaitStatus::Completed(PlaybackState::Finished));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use crate::audio::ProcessBackend;
        use std::os::unix::fs::PermissionsExt;
        use std::path::PathBuf;

        fn player(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("player.sh");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[test]
        fn test_process_timeout() {
            let dir = tempfile::tempdir().unwrap();
            let options = PlayOptions::new()
                .wait(true)
                .timeout_ms(500)
                .binary_path(player(dir.path(), "exec sleep 5"));
            let handle =
                Handle::with_backend(beep(), Box::new(ProcessBackend::new()), options).unwrap();

            let started = Instant::now();
            handle.play().unwrap();
            let elapsed = started.elapsed();

            assert!(elapsed >= Duration::from_millis(500));
            assert!(elapsed < Duration::from_secs(3));
            assert!(handle.timed_out());
            assert_eq!(handle.state(), PlaybackState::Stopped);
            handle.stop();
        }

        #[test]
        fn test_process_tone_plays_to_completion() {
            let dir = tempfile::tempdir().unwrap();
            let options = PlayOptions::new()
                .wait(true)
                .binary_path(player(dir.path(), "sleep 1"));
            let request = PlaybackRequest::tone(synthesize(440.0, 1000, 0.1));
            let handle =
                Handle::with_backend(request, Box::new(ProcessBackend::new()), options).unwrap();

            let started = Instant::now();
            handle.play().unwrap();
            let elapsed = started.elapsed();

            assert!(elapsed >= Duration::from_millis(900));
            assert!(elapsed < Duration::from_secs(4));
            assert_eq!(handle.state(), PlaybackState::Finished);
        }
    }
}
