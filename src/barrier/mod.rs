//! Rendezvous barrier
//!
//! Every expected participant issues the same operation; the barrier collects
//! the submissions, runs the operation exactly once when the set is complete,
//! and hands each submitter a copy of the single result.
//!
//! One round is in flight at a time. Callers arriving while the previous
//! round is still being collected by its submitters wait for it to reset.
//! All waits are bounded by the configured timeout and end with
//! `ParticipantTimeout`.

pub mod round;

pub use round::{PendingRound, RoundPhase, RoundResult};

use crate::error::DispatchError;
use crate::operation::{Outcome, Params};
use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, Notify};
use tokio::time::{timeout_at, Instant};

/// Identity of a participant, as authenticated by the transport
pub type CallerId = String;

/// Fixed, non-empty set of participants every round waits for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedParticipants(BTreeSet<CallerId>);

impl ExpectedParticipants {
    pub fn new<I>(participants: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = CallerId>,
    {
        let set: BTreeSet<CallerId> = participants
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if set.is_empty() {
            anyhow::bail!("at least one expected participant is required");
        }
        Ok(Self(set))
    }

    pub fn contains(&self, caller: &str) -> bool {
        self.0.contains(caller)
    }

    /// True if `submitted` is exactly this set
    pub fn matches(&self, submitted: &BTreeSet<CallerId>) -> bool {
        &self.0 == submitted
    }

    pub fn iter(&self) -> impl Iterator<Item = &CallerId> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Barrier over a single `PendingRound`
#[derive(Debug)]
pub struct Barrier {
    expected: ExpectedParticipants,
    timeout: Duration,
    round: Mutex<PendingRound>,
    /// Signalled after every state change of `round`
    changed: Notify,
}

impl Barrier {
    pub fn new(expected: ExpectedParticipants, timeout: Duration) -> Self {
        Self {
            expected,
            timeout,
            round: Mutex::new(PendingRound::new()),
            changed: Notify::new(),
        }
    }

    pub fn expected(&self) -> &ExpectedParticipants {
        &self.expected
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Current phase of the round
    pub async fn phase(&self) -> RoundPhase {
        self.round.lock().await.phase()
    }

    /// Submit `params` for `caller` and wait for the round's result
    ///
    /// The last expected participant to arrive runs `invoke` while holding
    /// the round, so no other caller can observe a half-finished invocation.
    /// Every submitter gets a clone of the same result.
    pub async fn synchronize<F, Fut>(
        &self,
        caller: &str,
        params: Params,
        invoke: F,
    ) -> Result<Outcome, DispatchError>
    where
        F: FnOnce(Params) -> Fut,
        Fut: Future<Output = Result<Outcome, DispatchError>>,
    {
        if !self.expected.contains(caller) {
            return Err(DispatchError::violation(format!(
                "{} is not an expected participant",
                caller
            )));
        }

        let deadline = Instant::now() + self.timeout;
        let operation = params.operation();
        let mut round = self.wait_for_reset(caller, deadline).await?;

        if let Err(err) = round.submit(params, caller) {
            log::warn!("{}: {}", caller, err);
            if round.phase() == RoundPhase::Collecting {
                round.fail(err.clone());
                self.changed.notify_waiters();
            }
            return Err(err);
        }
        log::debug!(
            "{} submitted {} ({}/{})",
            caller,
            operation,
            round.submitted().len(),
            self.expected.len()
        );

        if round.is_ready(&self.expected) {
            let params = round
                .params()
                .cloned()
                .ok_or_else(|| DispatchError::violation("ready round has no parameters"))?;
            log::debug!("all participants present, invoking {}", operation);

            let result = invoke(params).await;
            round.store(result)?;
            self.changed.notify_waiters();
            return self.take(&mut round, caller);
        }

        loop {
            let notified = self.changed.notified();
            drop(round);
            let timed_out = timeout_at(deadline, notified).await.is_err();
            round = self.round.lock().await;

            if !round.has_submitted(caller) {
                return Err(DispatchError::violation(format!(
                    "round ended before {} collected its result",
                    caller
                )));
            }
            if round.phase() == RoundPhase::Draining {
                return self.take(&mut round, caller);
            }
            if timed_out {
                let missing = round.missing(&self.expected);
                log::warn!("{} timed out waiting for {}", operation, missing.join(", "));
                round.fail(DispatchError::ParticipantTimeout { missing });
                self.changed.notify_waiters();
                return self.take(&mut round, caller);
            }
        }
    }

    /// Lock the round once the previous result has been collected
    async fn wait_for_reset(
        &self,
        caller: &str,
        deadline: Instant,
    ) -> Result<MutexGuard<'_, PendingRound>, DispatchError> {
        loop {
            let notified = self.changed.notified();
            // The invoker holds the round for the whole invocation
            let round = match timeout_at(deadline, self.round.lock()).await {
                Ok(round) => round,
                Err(_) => {
                    let missing: Vec<String> =
                        self.expected.iter().filter(|p| p.as_str() != caller).cloned().collect();
                    log::debug!("{} timed out behind a running invocation", caller);
                    return Err(DispatchError::ParticipantTimeout { missing });
                }
            };
            if round.phase() != RoundPhase::Draining {
                return Ok(round);
            }
            let pending = round.unretrieved();
            drop(round);

            log::debug!("{} waiting for {} to collect the previous result", caller, pending.join(", "));
            if timeout_at(deadline, notified).await.is_err() {
                return Err(DispatchError::ParticipantTimeout { missing: pending });
            }
        }
    }

    fn take(&self, round: &mut PendingRound, caller: &str) -> Result<Outcome, DispatchError> {
        let (result, reset) = round.retrieve(caller);
        if reset {
            log::debug!("round complete, reset by {}", caller);
            self.changed.notify_waiters();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::MatrixRef;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn barrier(names: &[&str], timeout: Duration) -> Arc<Barrier> {
        let expected = ExpectedParticipants::new(names.iter().map(|s| s.to_string())).unwrap();
        Arc::new(Barrier::new(expected, timeout))
    }

    fn rows() -> Params {
        Params::RowCount(MatrixRef { name: "DMatrix_0".into() })
    }

    async fn counted(
        barrier: &Barrier,
        caller: &str,
        params: Params,
        counter: Arc<AtomicUsize>,
        value: u64,
    ) -> Result<Outcome, DispatchError> {
        barrier
            .synchronize(caller, params, move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Outcome::Count(value))
            })
            .await
    }

    #[test]
    fn test_expected_participants_rejects_empty() {
        assert!(ExpectedParticipants::new(Vec::new()).is_err());
        assert!(ExpectedParticipants::new(vec!["  ".to_string()]).is_err());
        let set = ExpectedParticipants::new(vec!["b".to_string(), "a".to_string(), "a".to_string()]).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_single_invocation_shared_result() {
        let barrier = barrier(&["alice", "bob", "carol"], Duration::from_secs(5));
        let counter = Arc::new(AtomicUsize::new(0));

        let (a, b, c) = tokio::join!(
            counted(&barrier, "alice", rows(), counter.clone(), 1),
            counted(&barrier, "bob", rows(), counter.clone(), 2),
            counted(&barrier, "carol", rows(), counter.clone(), 3),
        );

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        let a = a.unwrap();
        assert_eq!(b.unwrap(), a);
        assert_eq!(c.unwrap(), a);
        assert_eq!(barrier.phase().await, RoundPhase::Empty);
    }

    #[tokio::test]
    async fn test_single_participant_runs_immediately() {
        let barrier = barrier(&["alice"], Duration::from_millis(100));
        let counter = Arc::new(AtomicUsize::new(0));
        let result = counted(&barrier, "alice", Params::InitGroup, counter.clone(), 9).await;
        assert_eq!(result, Ok(Outcome::Count(9)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_consecutive_rounds() {
        let barrier = barrier(&["alice", "bob"], Duration::from_secs(5));
        let counter = Arc::new(AtomicUsize::new(0));

        let run = |caller: &'static str| {
            let barrier = barrier.clone();
            let counter = counter.clone();
            async move {
                let mut results = Vec::new();
                for i in 0..5u64 {
                    results.push(counted(&barrier, caller, rows(), counter.clone(), i).await.unwrap());
                }
                results
            }
        };

        let (a, b) = tokio::join!(tokio::spawn(run("alice")), tokio::spawn(run("bob")));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a, b);
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_unexpected_caller_leaves_round_alone() {
        let barrier = barrier(&["alice", "bob"], Duration::from_secs(5));
        let counter = Arc::new(AtomicUsize::new(0));

        let alice = tokio::spawn({
            let barrier = barrier.clone();
            let counter = counter.clone();
            async move { counted(&barrier, "alice", rows(), counter, 4).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mallory = counted(&barrier, "mallory", rows(), counter.clone(), 0).await;
        assert!(matches!(mallory, Err(DispatchError::ProtocolViolation(_))));
        assert_eq!(barrier.phase().await, RoundPhase::Collecting);

        let bob = counted(&barrier, "bob", rows(), counter.clone(), 4).await;
        assert_eq!(bob, Ok(Outcome::Count(4)));
        assert_eq!(alice.await.unwrap(), Ok(Outcome::Count(4)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_names_missing_participants() {
        let barrier = barrier(&["alice", "bob", "carol"], Duration::from_millis(50));
        let counter = Arc::new(AtomicUsize::new(0));

        let (a, c) = tokio::join!(
            counted(&barrier, "alice", rows(), counter.clone(), 1),
            counted(&barrier, "carol", rows(), counter.clone(), 1),
        );

        let expected = DispatchError::ParticipantTimeout {
            missing: vec!["bob".to_string()],
        };
        assert_eq!(a, Err(expected.clone()));
        assert_eq!(c, Err(expected));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(barrier.phase().await, RoundPhase::Empty);
    }

    #[tokio::test]
    async fn test_mismatched_operation_fails_round() {
        let barrier = barrier(&["alice", "bob"], Duration::from_secs(5));
        let counter = Arc::new(AtomicUsize::new(0));

        let alice = tokio::spawn({
            let barrier = barrier.clone();
            let counter = counter.clone();
            async move { counted(&barrier, "alice", rows(), counter, 1).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let bob = counted(&barrier, "bob", Params::InitGroup, counter.clone(), 1).await;
        assert!(matches!(bob, Err(DispatchError::ProtocolViolation(_))));
        assert!(matches!(alice.await.unwrap(), Err(DispatchError::ProtocolViolation(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(barrier.phase().await, RoundPhase::Empty);
    }

    /// Leave a finished round with bob's result still uncollected
    async fn leave_draining(barrier: &Barrier) {
        let mut round = barrier.round.lock().await;
        round.submit(rows(), "alice").unwrap();
        round.submit(rows(), "bob").unwrap();
        round.store(Ok(Outcome::Count(1))).unwrap();
        let (result, reset) = round.retrieve("alice");
        assert_eq!(result, Ok(Outcome::Count(1)));
        assert!(!reset);
    }

    async fn slow_status(barrier: &Barrier, caller: &str, delay: Duration) -> Result<Outcome, DispatchError> {
        barrier
            .synchronize(caller, rows(), move |_| async move {
                tokio::time::sleep(delay).await;
                Ok(Outcome::Status(0))
            })
            .await
    }

    #[tokio::test]
    async fn test_next_round_waits_for_previous_to_drain() {
        let barrier = barrier(&["alice", "bob"], Duration::from_secs(5));
        let counter = Arc::new(AtomicUsize::new(0));
        leave_draining(&barrier).await;

        let alice = tokio::spawn({
            let barrier = barrier.clone();
            let counter = counter.clone();
            async move { counted(&barrier, "alice", rows(), counter, 2).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(barrier.phase().await, RoundPhase::Draining);

        {
            let mut round = barrier.round.lock().await;
            assert_eq!(barrier.take(&mut round, "bob"), Ok(Outcome::Count(1)));
        }

        let bob = counted(&barrier, "bob", rows(), counter.clone(), 2).await;
        assert_eq!(bob, Ok(Outcome::Count(2)));
        assert_eq!(alice.await.unwrap(), Ok(Outcome::Count(2)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drain_wait_times_out() {
        let barrier = barrier(&["alice", "bob"], Duration::from_millis(50));
        let counter = Arc::new(AtomicUsize::new(0));
        leave_draining(&barrier).await;

        let alice = counted(&barrier, "alice", rows(), counter.clone(), 2).await;
        assert_eq!(
            alice,
            Err(DispatchError::ParticipantTimeout {
                missing: vec!["bob".to_string()]
            })
        );
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(barrier.phase().await, RoundPhase::Draining);
    }

    #[tokio::test]
    async fn test_deadline_during_invocation_still_gets_result() {
        let barrier = barrier(&["alice", "bob"], Duration::from_millis(100));
        let counter = Arc::new(AtomicUsize::new(0));

        let alice = tokio::spawn({
            let barrier = barrier.clone();
            let counter = counter.clone();
            async move { counted(&barrier, "alice", rows(), counter, 1).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let bob = slow_status(&barrier, "bob", Duration::from_millis(300)).await;
        assert_eq!(bob, Ok(Outcome::Status(0)));
        assert_eq!(alice.await.unwrap(), Ok(Outcome::Status(0)));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(barrier.phase().await, RoundPhase::Empty);
    }

    #[tokio::test]
    async fn test_arrival_during_invocation_is_bounded() {
        let barrier = barrier(&["alice", "bob"], Duration::from_millis(50));
        let counter = Arc::new(AtomicUsize::new(0));

        let alice = tokio::spawn({
            let barrier = barrier.clone();
            let counter = counter.clone();
            async move { counted(&barrier, "alice", rows(), counter, 1).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let bob = tokio::spawn({
            let barrier = barrier.clone();
            async move { slow_status(&barrier, "bob", Duration::from_millis(400)).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = Instant::now();
        let again = counted(&barrier, "alice", rows(), counter.clone(), 1).await;
        assert_eq!(
            again,
            Err(DispatchError::ParticipantTimeout {
                missing: vec!["bob".to_string()]
            })
        );
        assert!(started.elapsed() < Duration::from_millis(300));

        assert_eq!(bob.await.unwrap(), Ok(Outcome::Status(0)));
        assert_eq!(alice.await.unwrap(), Ok(Outcome::Status(0)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_exactly_once_across_threads() {
        let names: Vec<String> = (0..8).map(|i| format!("p{}", i)).collect();
        let expected = ExpectedParticipants::new(names.clone()).unwrap();
        let barrier = Arc::new(Barrier::new(expected, Duration::from_secs(10)));
        let counter = Arc::new(AtomicUsize::new(0));
        let rounds = 20u64;

        let tasks: Vec<_> = names
            .into_iter()
            .map(|name| {
                let barrier = barrier.clone();
                let counter = counter.clone();
                tokio::spawn(async move {
                    let mut results = Vec::new();
                    for i in 0..rounds {
                        results.push(counted(&barrier, &name, rows(), counter.clone(), i).await.unwrap());
                    }
                    results
                })
            })
            .collect();

        let want: Vec<Outcome> = (0..rounds).map(Outcome::Count).collect();
        for results in futures::future::join_all(tasks).await {
            assert_eq!(results.unwrap(), want);
        }
        assert_eq!(counter.load(Ordering::SeqCst), rounds as usize);
        assert_eq!(barrier.phase().await, RoundPhase::Empty);
    }

    #[tokio::test]
    async fn test_invoke_error_reaches_every_caller() {
        let barrier = barrier(&["alice", "bob"], Duration::from_secs(5));
        let fail = |_: Params| async {
            Err(DispatchError::OperationFailed {
                operation: "row-count",
                reason: "enclave crashed".into(),
            })
        };

        let (a, b) = tokio::join!(
            barrier.synchronize("alice", rows(), fail),
            barrier.synchronize("bob", rows(), fail),
        );
        assert!(matches!(a, Err(DispatchError::OperationFailed { .. })));
        assert_eq!(a, b);
    }
}
