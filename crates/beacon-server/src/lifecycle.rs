//! Ordered startup and teardown of subsystems.
//!
//! A [`Lifecycle`] is a list of named steps run against a state registry `S`.
//! Each step has an init hook and an optional shutdown hook.
//!
//! # Execution Order
//!
//! - **Startup**: steps run in registration order, each bounded by the startup
//!   timeout. The first failure stops startup, tears down the steps that already
//!   started, and is returned as [`LifecycleError::StartupFailed`].
//! - **Shutdown**: the shutdown hooks of started steps run in reverse order, each
//!   bounded by the per-step timeout. A failing or hanging step is logged and
//!   teardown moves on; the failures are returned together.
//!
//! # Example
//!
//! ```rust
//! use beacon_server::Lifecycle;
//!
//! #[derive(Default)]
//! struct State {
//!     opened: Vec<&'static str>,
//! }
//!
//! # tokio_test::block_on(async {
//! let mut lifecycle = Lifecycle::<State>::new()
//!     .step("logging", |s| Box::pin(async move {
//!         s.opened.push("logging");
//!         Ok(())
//!     }))
//!     .step("database", |s| Box::pin(async move {
//!         s.opened.push("database");
//!         Ok(())
//!     }));
//!
//! let mut state = State::default();
//! lifecycle.start(&mut state).await.unwrap();
//! assert_eq!(state.opened, ["logging", "database"]);
//! lifecycle.shutdown(&state).await.unwrap();
//! # });
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use crate::error::{BoxError, LifecycleError, StepFailure};

/// Result of a lifecycle hook.
pub type StepResult = Result<(), BoxError>;

/// Future returned by a lifecycle hook.
pub type StepFuture<'a> = Pin<Box<dyn Future<Output = StepResult> + Send + 'a>>;

type InitHook<S> = Box<dyn for<'a> Fn(&'a mut S) -> StepFuture<'a> + Send + Sync>;
type ShutdownHook<S> = Box<dyn for<'a> Fn(&'a S) -> StepFuture<'a> + Send + Sync>;

/// Default bound on each init hook.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(15);

/// Default bound on each shutdown hook.
pub const DEFAULT_STEP_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

struct Step<S> {
    name: String,
    init: InitHook<S>,
    shutdown: Option<ShutdownHook<S>>,
}

/// Startup and teardown orchestrator.
#[must_use]
pub struct Lifecycle<S> {
    steps: Vec<Step<S>>,
    started: usize,
    startup_timeout: Duration,
    step_shutdown_timeout: Duration,
}

impl<S> Default for Lifecycle<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for Lifecycle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("steps", &self.step_names())
            .field("started", &self.started)
            .field("startup_timeout", &self.startup_timeout)
            .field("step_shutdown_timeout", &self.step_shutdown_timeout)
            .finish()
    }
}

impl<S> Lifecycle<S> {
    /// Creates a lifecycle with no steps and the default timeouts.
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            started: 0,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            step_shutdown_timeout: DEFAULT_STEP_SHUTDOWN_TIMEOUT,
        }
    }

    /// Sets the bound on each init hook.
    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Sets the bound on each shutdown hook.
    pub fn step_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.step_shutdown_timeout = timeout;
        self
    }

    /// Adds a step without a shutdown hook.
    pub fn step<I>(self, name: impl Into<String>, init: I) -> Self
    where
        I: for<'a> Fn(&'a mut S) -> StepFuture<'a> + Send + Sync + 'static,
    {
        self.push(name.into(), Box::new(init), None)
    }

    /// Adds a step with a shutdown hook.
    pub fn step_with_shutdown<I, D>(self, name: impl Into<String>, init: I, shutdown: D) -> Self
    where
        I: for<'a> Fn(&'a mut S) -> StepFuture<'a> + Send + Sync + 'static,
        D: for<'a> Fn(&'a S) -> StepFuture<'a> + Send + Sync + 'static,
    {
        self.push(name.into(), Box::new(init), Some(Box::new(shutdown)))
    }

    fn push(mut self, name: String, init: InitHook<S>, shutdown: Option<ShutdownHook<S>>) -> Self {
        self.steps.push(Step {
            name,
            init,
            shutdown,
        });
        self
    }

    /// Returns the step names in startup order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    /// Returns the number of steps that completed startup.
    pub fn started_steps(&self) -> usize {
        self.started
    }

    /// Runs every init hook in order.
    ///
    /// On failure the steps that already started are shut down before the
    /// error is returned.
    pub async fn start(&mut self, state: &mut S) -> Result<(), LifecycleError> {
        for index in self.started..self.steps.len() {
            let step = &self.steps[index];
            let begun = Instant::now();

            let outcome = match tokio::time::timeout(self.startup_timeout, (step.init)(state)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(format!("timed out after {:?}", self.startup_timeout).into()),
            };

            match outcome {
                Ok(()) => {
                    self.started = index + 1;
                    tracing::info!(
                        step = %step.name,
                        duration_ms = begun.elapsed().as_millis() as u64,
                        "Startup step completed"
                    );
                }
                Err(source) => {
                    let name = step.name.clone();
                    tracing::error!(step = %name, error = %source, "Startup step failed");
                    if let Err(e) = self.shutdown(state).await {
                        tracing::warn!(error = %e, "Rollback after failed startup was incomplete");
                    }
                    return Err(LifecycleError::StartupFailed { step: name, source });
                }
            }
        }

        Ok(())
    }

    /// Runs the shutdown hooks of started steps in reverse order.
    ///
    /// Every hook is attempted. Calling this again without a new
    /// [`start`](Self::start) does nothing.
    pub async fn shutdown(&mut self, state: &S) -> Result<(), LifecycleError> {
        let mut failures = Vec::new();

        for step in self.steps[..self.started].iter().rev() {
            let Some(hook) = &step.shutdown else {
                continue;
            };

            match tokio::time::timeout(self.step_shutdown_timeout, hook(state)).await {
                Ok(Ok(())) => tracing::info!(step = %step.name, "Shutdown step completed"),
                Ok(Err(e)) => {
                    tracing::error!(step = %step.name, error = %e, "Shutdown step failed");
                    failures.push(StepFailure {
                        step: step.name.clone(),
                        reason: e.to_string(),
                    });
                }
                Err(_) => {
                    tracing::error!(
                        step = %step.name,
                        timeout_ms = self.step_shutdown_timeout.as_millis() as u64,
                        "Shutdown step timed out"
                    );
                    failures.push(StepFailure {
                        step: step.name.clone(),
                        reason: format!("timed out after {:?}", self.step_shutdown_timeout),
                    });
                }
            }
        }

        self.started = 0;

        if failures.is_empty() {
            Ok(())
        } else {
            Err(LifecycleError::ShutdownFailed { failures })
        }
    }
}
