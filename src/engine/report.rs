use std::fmt;
use tracing::{error, info};

/// Final status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Failed,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one run.
///
/// A successful run never carries an error; a failed run always does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub status: Status,
    /// Progress messages in the order they happened, newline-joined.
    pub output: String,
    /// Error messages, newline-joined. Empty on success.
    pub error: String,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// `("Success" | "Failed", output, error)`.
    pub fn into_tuple(self) -> (String, String, String) {
        (self.status.as_str().to_string(), self.output, self.error)
    }
}

/// Append-only progress log for one run.
///
/// After the first failure no further progress is recorded, so the output
/// stops at the point the run broke.
#[derive(Debug, Default)]
pub struct Reporter {
    output: Vec<String>,
    errors: Vec<String>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        if self.failed() {
            return;
        }
        let message = message.into();
        info!("{}", message);
        self.output.push(message);
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!("{}", message);
        self.errors.push(message);
    }

    pub fn failed(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Messages recorded so far.
    pub fn lines(&self) -> &[String] {
        &self.output
    }

    pub fn finish(self) -> RunOutcome {
        let status = if self.failed() {
            Status::Failed
        } else {
            Status::Success
        };
        RunOutcome {
            status,
            output: self.output.join("\n"),
            error: self.errors.join("\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_has_no_error() {
        let mut reporter = Reporter::new();
        reporter.push("Entramos a relacionesPropias");
        reporter.push("Cambiamos a la ventana nueva");
        let outcome = reporter.finish();
        assert_eq!(outcome.status, Status::Success);
        assert_eq!(
            outcome.output,
            "Entramos a relacionesPropias\nCambiamos a la ventana nueva"
        );
        assert!(outcome.error.is_empty());
    }

    #[test]
    fn test_progress_stops_after_failure() {
        let mut reporter = Reporter::new();
        reporter.push("first");
        reporter.fail("timeout: dropdown");
        reporter.push("never recorded");
        let outcome = reporter.finish();
        assert_eq!(outcome.status, Status::Failed);
        assert_eq!(outcome.output, "first");
        assert_eq!(outcome.error, "timeout: dropdown");
    }

    #[test]
    fn test_empty_run_is_well_formed() {
        let (status, output, error) = Reporter::new().finish().into_tuple();
        assert_eq!(status, "Success");
        assert_eq!(output, "");
        assert_eq!(error, "");
    }

    #[test]
    fn test_errors_are_newline_joined() {
        let mut reporter = Reporter::new();
        reporter.fail("step failed");
        reporter.fail("close failed");
        let outcome = reporter.finish();
        assert_eq!(outcome.error, "step failed\nclose failed");
    }
}
