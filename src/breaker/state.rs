//! Circuit breaker state machine

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use super::window::RollingWindow;
use crate::config::BreakerSettings;
use crate::errors::{GatewayError, GatewayResult};
use crate::logger::{self, LogTag};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    /// The single half-open probe
    Trial,
}

struct Inner {
    state: CircuitState,
    opened_at: Option<Instant>,
    window: RollingWindow,
    trial_in_flight: bool,
    last_error: Option<String>,
}

/// Named circuit breaker guarding one kind of call
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    inner: Mutex<Inner>,
    in_flight: Semaphore,
    total_opens: AtomicU64,
    short_circuited: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(name: &str, settings: BreakerSettings) -> Self {
        Self {
            name: name.to_string(),
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                opened_at: None,
                window: RollingWindow::new(settings.rolling_window_secs),
                trial_in_flight: false,
                last_error: None,
            }),
            in_flight: Semaphore::new(settings.max_concurrent.max(1)),
            settings,
            total_opens: AtomicU64::new(0),
            short_circuited: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current_state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Run `operation` under the breaker, falling back on any failure
    ///
    /// The fallback receives the reason (operation error, timeout, open
    /// circuit, or concurrency limit) and its result is returned as is.
    /// Operation errors and timeouts count toward the error rate; calls turned
    /// away without running do not.
    pub async fn protect<T, Op, OpFut, Fb, FbFut>(&self, operation: Op, fallback: Fb) -> GatewayResult<T>
    where
        Op: FnOnce() -> OpFut,
        OpFut: Future<Output = GatewayResult<T>>,
        Fb: FnOnce(GatewayError) -> FbFut,
        FbFut: Future<Output = GatewayResult<T>>,
    {
        let _permit = match self.in_flight.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                self.short_circuited.fetch_add(1, Ordering::Relaxed);
                return fallback(GatewayError::unavailable(
                    self.name.as_str(),
                    "max concurrent requests reached",
                ))
                .await;
            }
        };

        let admission = match self.try_admit() {
            Ok(admission) => admission,
            Err(remaining) => {
                self.short_circuited.fetch_add(1, Ordering::Relaxed);
                logger::debug(
                    LogTag::Breaker,
                    &format!(
                        "{} open, short-circuiting ({}ms until trial)",
                        self.name,
                        remaining.as_millis()
                    ),
                );
                return fallback(GatewayError::unavailable(self.name.as_str(), "circuit open")).await;
            }
        };

        let mut guard = TrialGuard {
            breaker: self,
            armed: admission == Admission::Trial,
        };

        let timeout = self.settings.timeout();
        let outcome = match tokio::time::timeout(timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::timeout(self.name.as_str(), timeout)),
        };
        guard.armed = false;

        match outcome {
            Ok(value) => {
                self.record_success(admission);
                Ok(value)
            }
            Err(err) => {
                self.record_failure(admission, &err);
                fallback(err).await
            }
        }
    }

    /// Decide whether a call may run; `Err` carries time left in the cooldown
    fn try_admit(&self) -> Result<Admission, Duration> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::MAX);
                let sleep = self.settings.sleep_window();
                if elapsed >= sleep {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    logger::info(
                        LogTag::Breaker,
                        &format!("{} half-open, allowing one trial call", self.name),
                    );
                    Ok(Admission::Trial)
                } else {
                    Err(sleep - elapsed)
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    Err(Duration::ZERO)
                } else {
                    inner.trial_in_flight = true;
                    Ok(Admission::Trial)
                }
            }
        }
    }

    fn record_success(&self, admission: Admission) {
        let mut inner = self.inner.lock();
        if admission == Admission::Trial {
            inner.state = CircuitState::Closed;
            inner.trial_in_flight = false;
            inner.opened_at = None;
            inner.last_error = None;
            inner.window.reset();
            logger::info(LogTag::Breaker, &format!("{} closed after successful trial", self.name));
            return;
        }
        inner.window.record(true);
    }

    fn record_failure(&self, admission: Admission, err: &GatewayError) {
        let mut inner = self.inner.lock();
        inner.last_error = Some(err.to_string());

        if admission == Admission::Trial {
            self.trip(&mut inner, "trial call failed");
            return;
        }

        inner.window.record(false);
        if inner.state != CircuitState::Closed {
            return;
        }
        let counts = inner.window.counts();
        if counts.requests >= self.settings.request_volume_threshold
            && counts.error_percent() >= self.settings.error_percent_threshold
        {
            let reason = format!(
                "error rate {}% over {} requests",
                counts.error_percent(),
                counts.requests
            );
            self.trip(&mut inner, &reason);
        }
    }

    fn trip(&self, inner: &mut Inner, reason: &str) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.trial_in_flight = false;
        self.total_opens.fetch_add(1, Ordering::Relaxed);
        logger::warning(
            LogTag::Breaker,
            &format!(
                "{} opened: {} (cooldown {}ms)",
                self.name, reason, self.settings.sleep_window_ms
            ),
        );
    }

    /// A trial call was dropped before finishing; reopen for another cooldown
    fn abandon_trial(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen && inner.trial_in_flight {
            self.trip(&mut inner, "trial call cancelled");
        }
    }

    pub fn status(&self) -> BreakerStatus {
        let inner = self.inner.lock();
        let counts = inner.window.counts();
        let time_until_trial = match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(at)) => {
                Some(self.settings.sleep_window().saturating_sub(at.elapsed()))
            }
            _ => None,
        };
        BreakerStatus {
            name: self.name.clone(),
            state: inner.state,
            window_requests: counts.requests,
            window_failures: counts.failures,
            error_percent: counts.error_percent(),
            total_opens: self.total_opens.load(Ordering::Relaxed),
            short_circuited: self.short_circuited.load(Ordering::Relaxed),
            last_error: inner.last_error.clone(),
            time_until_trial,
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.current_state())
            .field("total_opens", &self.total_opens.load(Ordering::Relaxed))
            .finish()
    }
}

struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.abandon_trial();
        }
    }
}

/// Snapshot of a breaker, served on `/health`
#[derive(Debug, Clone, serde::Serialize)]
pub struct BreakerStatus {
    pub name: String,
    #[serde(serialize_with = "serialize_state")]
    pub state: CircuitState,
    pub window_requests: u32,
    pub window_failures: u32,
    pub error_percent: u32,
    pub total_opens: u64,
    pub short_circuited: u64,
    pub last_error: Option<String>,
    #[serde(serialize_with = "serialize_millis")]
    pub time_until_trial: Option<Duration>,
}

fn serialize_state<S: serde::Serializer>(state: &CircuitState, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(state)
}

fn serialize_millis<S: serde::Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(d) => s.serialize_some(&(d.as_millis() as u64)),
        None => s.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn settings() -> BreakerSettings {
        BreakerSettings {
            timeout_ms: 1000,
            max_concurrent: 10,
            error_percent_threshold: 50,
            request_volume_threshold: 4,
            sleep_window_ms: 5000,
            rolling_window_secs: 10,
        }
    }

    async fn fail(cb: &CircuitBreaker) -> GatewayResult<&'static str> {
        cb.protect(
            || async { Err(GatewayError::unavailable("backend", "boom")) },
            |_| async { Ok("fallback") },
        )
        .await
    }

    #[tokio::test]
    async fn closed_breaker_passes_results_through() {
        let cb = CircuitBreaker::new("test", settings());
        let value = cb
            .protect(|| async { Ok(7) }, |_| async { Ok(0) })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(cb.current_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn fallback_result_is_final_including_errors() {
        let cb = CircuitBreaker::new("test", settings());
        let err = cb
            .protect(
                || async { Err::<(), _>(GatewayError::unavailable("backend", "down")) },
                |cause| async move { Err(GatewayError::Fatal(format!("fallback saw: {}", cause))) },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Fatal(msg) if msg.contains("down")));
    }

    #[tokio::test]
    async fn does_not_trip_below_volume_threshold() {
        let cb = CircuitBreaker::new("test", settings());
        for _ in 0..3 {
            assert_eq!(fail(&cb).await.unwrap(), "fallback");
        }
        assert_eq!(cb.current_state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn trips_then_bypasses_until_cooldown_then_single_trial() {
        let cb = Arc::new(CircuitBreaker::new("test", settings()));
        for _ in 0..4 {
            fail(&cb).await.unwrap();
        }
        assert_eq!(cb.current_state(), CircuitState::Open);

        // Open: the operation must not run
        let calls = AtomicUsize::new(0);
        let result = cb
            .protect(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("ran")
                },
                |_| async { Ok("bypassed") },
            )
            .await
            .unwrap();
        assert_eq!(result, "bypassed");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_millis(5001)).await;

        // Exactly one trial runs while a second caller is bypassed
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let trial = {
            let cb = cb.clone();
            tokio::spawn(async move {
                cb.protect(
                    || async move {
                        let _ = release_rx.await;
                        Ok("trial")
                    },
                    |_| async { Ok("bypassed") },
                )
                .await
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(cb.current_state(), CircuitState::HalfOpen);

        let second = cb
            .protect(|| async { Ok("ran") }, |_| async { Ok("bypassed") })
            .await
            .unwrap();
        assert_eq!(second, "bypassed");

        release_tx.send(()).unwrap();
        assert_eq!(trial.await.unwrap().unwrap(), "trial");
        assert_eq!(cb.current_state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_trial_reopens_and_restarts_cooldown() {
        let cb = CircuitBreaker::new("test", settings());
        for _ in 0..4 {
            fail(&cb).await.unwrap();
        }
        tokio::time::advance(Duration::from_millis(5001)).await;

        fail(&cb).await.unwrap();
        assert_eq!(cb.current_state(), CircuitState::Open);
        assert_eq!(cb.status().total_opens, 2);

        tokio::time::advance(Duration::from_millis(4000)).await;
        let result = cb
            .protect(|| async { Ok("ran") }, |_| async { Ok("bypassed") })
            .await
            .unwrap();
        assert_eq!(result, "bypassed");
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_count_as_failures() {
        let cb = CircuitBreaker::new(
            "slow",
            BreakerSettings {
                request_volume_threshold: 1,
                ..settings()
            },
        );
        let err = cb
            .protect(
                || async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                },
                |cause| async move { Err(cause) },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Timeout { millis: 1000, .. }));
        assert_eq!(cb.current_state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn concurrency_limit_goes_to_fallback() {
        let cb = Arc::new(CircuitBreaker::new(
            "narrow",
            BreakerSettings {
                max_concurrent: 1,
                ..settings()
            },
        ));
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let busy = {
            let cb = cb.clone();
            tokio::spawn(async move {
                cb.protect(
                    || async move {
                        let _ = release_rx.await;
                        Ok(1)
                    },
                    |_| async { Ok(0) },
                )
                .await
            })
        };
        tokio::task::yield_now().await;

        let rejected = cb
            .protect(|| async { Ok(1) }, |_| async { Ok(-1) })
            .await
            .unwrap();
        assert_eq!(rejected, -1);

        release_tx.send(()).unwrap();
        assert_eq!(busy.await.unwrap().unwrap(), 1);
        let status = cb.status();
        assert_eq!(status.short_circuited, 1);
        // A call turned away without running is not a failure
        assert_eq!(status.window_requests, 1);
        assert_eq!(status.window_failures, 0);
    }
}
