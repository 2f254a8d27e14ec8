//! Step driver.
//!
//! A flow is a sequence of named steps. Each step declares what a failure
//! means through its [`Policy`]; the driver runs the step, records the
//! outcome and decides whether the flow may go on.
//!
//! Setup and key-resolution errors (see [`Error::is_fatal`]) halt the run
//! whatever the policy says.
//!
//! ```
//! use fieldvault::driver::{Driver, Policy, StepOutcome};
//! use fieldvault::error::Error;
//! use fieldvault::event::NoopObserver;
//!
//! let observer = NoopObserver;
//! let mut driver = Driver::new(&observer);
//! let rejected = driver.step("insert plaintext", Policy::ExpectFailure, || {
//!     Err::<(), _>(Error::DocumentValidation("ssn must be encrypted".into()))
//! });
//! assert!(rejected.is_none());
//!
//! let report = driver.finish();
//! assert!(report.is_complete());
//! assert!(matches!(report.steps()[0].outcome, StepOutcome::ExpectedFailure { .. }));
//! ```

use std::fmt;

use crate::error::{Error, ErrorKind};
use crate::event::{Event, Observer};

/// What a failing step means for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// A failure halts the run.
    Abort,
    /// A failure is recorded and the run goes on.
    Continue,
    /// The step is supposed to fail; success is flagged.
    ExpectFailure,
}

/// Result of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step completed.
    Succeeded,
    /// The step failed and was not supposed to.
    Failed {
        /// Failure class
        kind: ErrorKind,
        /// Rendered error
        error: String,
    },
    /// The step failed as declared.
    ExpectedFailure {
        /// Rendered error
        error: String,
    },
    /// The step was declared to fail but completed.
    UnexpectedSuccess,
}

impl StepOutcome {
    /// Whether the outcome matches what the step declared.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Succeeded | Self::ExpectedFailure { .. })
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "ok"),
            Self::Failed { kind, error } => write!(f, "failed ({kind}): {error}"),
            Self::ExpectedFailure { error } => write!(f, "failed as expected: {error}"),
            Self::UnexpectedSuccess => write!(f, "succeeded but was expected to fail"),
        }
    }
}

/// A step and its outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    /// Step name
    pub name: String,
    /// Policy the step ran under
    pub policy: Policy,
    /// What happened
    pub outcome: StepOutcome,
}

/// Steps of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    steps: Vec<StepRecord>,
    halted_at: Option<String>,
}

impl RunReport {
    /// Every step that ran, in order.
    #[must_use]
    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    /// Name of the step that halted the run, if any.
    #[must_use]
    pub fn halted_at(&self) -> Option<&str> {
        self.halted_at.as_deref()
    }

    /// Whether the run reached its end.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.halted_at.is_none()
    }

    /// Steps whose outcome differs from what they declared.
    pub fn problems(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter().filter(|s| !s.outcome.is_ok())
    }

    /// Record of a named step.
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.name == name)
    }
}

/// Runs steps and keeps the run report.
pub struct Driver<'a> {
    observer: &'a dyn Observer,
    report: RunReport,
}

impl fmt::Debug for Driver<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver").field("report", &self.report).finish_non_exhaustive()
    }
}

impl<'a> Driver<'a> {
    /// Creates a driver reporting to `observer`.
    #[must_use]
    pub fn new(observer: &'a dyn Observer) -> Self {
        Self { observer, report: RunReport::default() }
    }

    /// The observer steps report to.
    #[must_use]
    pub fn observer(&self) -> &'a dyn Observer {
        self.observer
    }

    /// Reports an event.
    pub fn emit(&self, event: Event) {
        self.observer.on_event(&event);
    }

    /// Whether a previous step halted the run.
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.report.halted_at.is_some()
    }

    /// Runs a step.
    ///
    /// Returns the step's value on success, `None` on failure or when the
    /// run has already halted (the step is then not run at all).
    pub fn step<T, F>(&mut self, name: &str, policy: Policy, f: F) -> Option<T>
    where
        F: FnOnce() -> Result<T, Error>,
    {
        if self.is_halted() {
            return None;
        }

        self.emit(Event::StepStarted { name: name.to_string() });
        let result = f();

        let (outcome, value, halt) = match result {
            Ok(value) if policy == Policy::ExpectFailure => {
                (StepOutcome::UnexpectedSuccess, Some(value), false)
            }
            Ok(value) => (StepOutcome::Succeeded, Some(value), false),
            Err(err) if err.is_fatal() || policy == Policy::Abort => {
                (StepOutcome::Failed { kind: err.kind(), error: err.to_string() }, None, true)
            }
            Err(err) if policy == Policy::ExpectFailure => {
                (StepOutcome::ExpectedFailure { error: err.to_string() }, None, false)
            }
            Err(err) => (StepOutcome::Failed { kind: err.kind(), error: err.to_string() }, None, false),
        };

        match &outcome {
            StepOutcome::Succeeded | StepOutcome::UnexpectedSuccess => {
                self.emit(Event::StepSucceeded { name: name.to_string() });
            }
            StepOutcome::Failed { error, .. } => self.emit(Event::StepFailed {
                name: name.to_string(),
                error: error.clone(),
                expected: false,
            }),
            StepOutcome::ExpectedFailure { error } => self.emit(Event::StepFailed {
                name: name.to_string(),
                error: error.clone(),
                expected: true,
            }),
        }

        if halt {
            self.report.halted_at = Some(name.to_string());
        }
        self.report.steps.push(StepRecord { name: name.to_string(), policy, outcome });
        value
    }

    /// Ends the run.
    #[must_use]
    pub fn finish(self) -> RunReport {
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{NoopObserver, RecordingObserver};

    fn rejected() -> Error {
        Error::DocumentValidation("ssn must be encrypted".to_string())
    }

    #[test]
    fn test_abort_halts_and_skips_later_steps() {
        let observer = NoopObserver;
        let mut driver = Driver::new(&observer);

        assert_eq!(driver.step("first", Policy::Abort, || Ok(1)), Some(1));
        assert_eq!(driver.step("second", Policy::Abort, || Err::<i32, _>(rejected())), None);

        let mut ran = false;
        let skipped = driver.step("third", Policy::Continue, || {
            ran = true;
            Ok(3)
        });
        assert_eq!(skipped, None);
        assert!(!ran);

        let report = driver.finish();
        assert!(!report.is_complete());
        assert_eq!(report.halted_at(), Some("second"));
        assert_eq!(report.steps().len(), 2);
    }

    #[test]
    fn test_continue_records_failure() {
        let observer = NoopObserver;
        let mut driver = Driver::new(&observer);
        assert_eq!(driver.step("insert", Policy::Continue, || Err::<(), _>(rejected())), None);
        assert_eq!(driver.step("find", Policy::Abort, || Ok("found")), Some("found"));

        let report = driver.finish();
        assert!(report.is_complete());
        let problems: Vec<_> = report.problems().map(|s| s.name.as_str()).collect();
        assert_eq!(problems, ["insert"]);
        assert!(matches!(
            report.step("insert").unwrap().outcome,
            StepOutcome::Failed { kind: ErrorKind::Operation, .. }
        ));
    }

    #[test]
    fn test_fatal_error_halts_under_any_policy() {
        for policy in [Policy::Continue, Policy::ExpectFailure] {
            let observer = NoopObserver;
            let mut driver = Driver::new(&observer);
            driver.step("resolve key", policy, || {
                Err::<(), _>(Error::KeyAltNameNotFound("ssn.people.CSFLE".to_string()))
            });
            let report = driver.finish();
            assert_eq!(report.halted_at(), Some("resolve key"));
        }
    }

    #[test]
    fn test_unexpected_success_is_flagged() {
        let observer = NoopObserver;
        let mut driver = Driver::new(&observer);
        assert_eq!(driver.step("insert plaintext", Policy::ExpectFailure, || Ok(7)), Some(7));

        let report = driver.finish();
        assert!(report.is_complete());
        assert_eq!(report.steps()[0].outcome, StepOutcome::UnexpectedSuccess);
        assert_eq!(report.problems().count(), 1);
    }

    #[test]
    fn test_steps_are_reported_to_observer() {
        let observer = RecordingObserver::new();
        let mut driver = Driver::new(&observer);
        driver.step("insert plaintext", Policy::ExpectFailure, || Err::<(), _>(rejected()));

        let events = observer.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], Event::StepStarted { name: "insert plaintext".to_string() });
        assert!(matches!(&events[1], Event::StepFailed { expected: true, .. }));
    }
}
