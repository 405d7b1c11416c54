use crate::error::Result;
use log::{error, info, warn};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Extract,
    ConsolidateAndValidate,
    MarkForRetry,
    Success,
    Exhausted,
}

/// Which reports an extraction pass covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionScope {
    All,
    /// Only the listed source documents (`file_source` values).
    Only(BTreeSet<String>),
}

/// The side effects driven by [`RetryController`].
pub trait PipelineStages {
    fn extract(&mut self, scope: &ExtractionScope) -> Result<()>;

    /// Rebuilds the consolidated tables and returns the failing sources.
    fn consolidate_and_validate(&mut self) -> Result<BTreeSet<String>>;

    fn mark_for_retry(&mut self, failing: &BTreeSet<String>) -> Result<()>;

    fn on_success(&mut self) -> Result<()>;

    fn on_exhausted(&mut self, failing: &BTreeSet<String>) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome {
    /// `Success` or `Exhausted`.
    pub state: RetryState,
    /// Validation passes performed.
    pub attempts: usize,
    pub failing_sources: BTreeSet<String>,
    /// Every state visited, terminal state included.
    pub trace: Vec<RetryState>,
}

impl RetryOutcome {
    pub fn succeeded(&self) -> bool {
        self.state == RetryState::Success
    }
}

pub struct RetryController {
    max_retries: usize,
}

impl RetryController {
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries: max_retries.max(1),
        }
    }

    /// Runs one full extraction pass, then at most `max_retries` validation
    /// passes, re-extracting only the failing documents in between.
    pub fn run<S: PipelineStages + ?Sized>(&self, stages: &mut S) -> Result<RetryOutcome> {
        let mut state = RetryState::Extract;
        let mut scope = ExtractionScope::All;
        let mut attempts = 0;
        let mut failing = BTreeSet::new();
        let mut trace = Vec::new();

        loop {
            trace.push(state);
            state = match state {
                RetryState::Extract => {
                    stages.extract(&scope)?;
                    RetryState::ConsolidateAndValidate
                }
                RetryState::ConsolidateAndValidate => {
                    attempts += 1;
                    info!("=== Validation attempt {}/{} ===", attempts, self.max_retries);
                    failing = stages.consolidate_and_validate()?;

                    if failing.is_empty() {
                        RetryState::Success
                    } else if attempts >= self.max_retries {
                        RetryState::Exhausted
                    } else {
                        warn!("Validation failed for data from: {:?}", failing);
                        RetryState::MarkForRetry
                    }
                }
                RetryState::MarkForRetry => {
                    info!("Marking failing documents for re-extraction");
                    stages.mark_for_retry(&failing)?;
                    scope = ExtractionScope::Only(failing.clone());
                    RetryState::Extract
                }
                RetryState::Success => {
                    info!("All validations passed after {} attempt(s)", attempts);
                    stages.on_success()?;
                    return Ok(RetryOutcome {
                        state,
                        attempts,
                        failing_sources: failing,
                        trace,
                    });
                }
                RetryState::Exhausted => {
                    error!(
                        "Reached max retries ({}). Please review these source documents manually: {:?}",
                        self.max_retries, failing
                    );
                    stages.on_exhausted(&failing)?;
                    return Ok(RetryOutcome {
                        state,
                        attempts,
                        failing_sources: failing,
                        trace,
                    });
                }
            };
        }
    }
}
