//! State of one barriered round
//!
//! `PendingRound` is the single mutable slot every caller of a node shares.
//! It is a plain state machine with no locking of its own; the `Barrier`
//! owns it behind one mutex.
//!
//! ```text
//! EMPTY --submit--> COLLECTING --store--> DRAINING --last retrieve--> EMPTY
//!                        |                                 ^
//!                        +------------fail-----------------+
//! ```

use super::{CallerId, ExpectedParticipants};
use crate::error::DispatchError;
use crate::operation::{Operation, Outcome, Params};
use std::collections::BTreeSet;

/// Result a round ends with, shared by every caller of the round
pub type RoundResult = Result<Outcome, DispatchError>;

/// Observable phase of a round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    /// No operation bound
    Empty,
    /// Operation bound, waiting for the remaining participants
    Collecting,
    /// Result available, callers are retrieving their copies
    Draining,
}

/// Mutable state of the in-flight operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PendingRound {
    params: Option<Params>,
    submitted: BTreeSet<CallerId>,
    retrieved: BTreeSet<CallerId>,
    result: Option<RoundResult>,
}

impl PendingRound {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> RoundPhase {
        if self.result.is_some() {
            RoundPhase::Draining
        } else if self.params.is_some() {
            RoundPhase::Collecting
        } else {
            RoundPhase::Empty
        }
    }

    /// Operation bound to this round, if any
    pub fn operation(&self) -> Option<Operation> {
        self.params.as_ref().map(Params::operation)
    }

    /// Merged parameters (the first submitter's)
    pub fn params(&self) -> Option<&Params> {
        self.params.as_ref()
    }

    pub fn submitted(&self) -> &BTreeSet<CallerId> {
        &self.submitted
    }

    pub fn has_submitted(&self, caller: &str) -> bool {
        self.submitted.contains(caller)
    }

    /// Register one caller's intent to run `params`
    ///
    /// The first submission binds the operation. A later submission for a
    /// different operation is a protocol violation. Submitting twice is a
    /// no-op.
    pub fn submit(&mut self, params: Params, caller: &str) -> Result<(), DispatchError> {
        if self.result.is_some() {
            return Err(DispatchError::violation(format!(
                "{} submitted while the previous round is still draining",
                caller
            )));
        }

        match self.operation() {
            None => self.params = Some(params),
            Some(bound) if bound != params.operation() => {
                return Err(DispatchError::violation(format!(
                    "{} submitted {} while {} is collecting",
                    caller,
                    params.operation(),
                    bound
                )));
            }
            Some(_) => {}
        }

        self.submitted.insert(caller.to_string());
        Ok(())
    }

    /// True once exactly the expected participants have submitted
    pub fn is_ready(&self, expected: &ExpectedParticipants) -> bool {
        self.result.is_none() && self.params.is_some() && expected.matches(&self.submitted)
    }

    /// Participants that have not submitted yet
    pub fn missing(&self, expected: &ExpectedParticipants) -> Vec<String> {
        expected
            .iter()
            .filter(|p| !self.submitted.contains(*p))
            .cloned()
            .collect()
    }

    /// Submitters that still have to collect their copy of the result
    pub fn unretrieved(&self) -> Vec<String> {
        self.submitted.difference(&self.retrieved).cloned().collect()
    }

    /// Store the result of the single invocation
    pub fn store(&mut self, result: RoundResult) -> Result<(), DispatchError> {
        if self.result.is_some() {
            return Err(DispatchError::violation("round result stored twice"));
        }
        self.result = Some(result);
        Ok(())
    }

    /// End the round with `error` for every caller that submitted
    ///
    /// Ignored if the round already has a result.
    pub fn fail(&mut self, error: DispatchError) {
        if self.result.is_none() {
            self.result = Some(Err(error));
        }
    }

    /// Hand `caller` its copy of the result
    ///
    /// The round resets once every submitter has retrieved. Returns the
    /// caller's result and whether this call performed the reset.
    pub fn retrieve(&mut self, caller: &str) -> (RoundResult, bool) {
        let Some(result) = self.result.as_ref() else {
            return (
                Err(DispatchError::violation(format!("{} asked for a result before invoke", caller))),
                false,
            );
        };
        if !self.submitted.contains(caller) {
            return (
                Err(DispatchError::violation(format!("{} did not submit to this round", caller))),
                false,
            );
        }

        let result = result.clone();
        self.retrieved.insert(caller.to_string());

        if self.is_complete() {
            self.reset();
            (result, true)
        } else {
            (result, false)
        }
    }

    /// Every submitter has retrieved its copy
    pub fn is_complete(&self) -> bool {
        !self.submitted.is_empty() && self.retrieved == self.submitted
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
