//! Reduction of per-peer replies
//!
//! The orchestrator receives one `Outcome` per peer, in peer-topology order,
//! and merges them into the single result every caller receives. A reduction
//! never fabricates a winner: any disagreement fails the whole round.
//!
//! # Policies
//!
//! - **StatusSum**: success iff every peer reports status 0
//! - **UnanimousIdentity**: every peer returned the same handle or count
//! - **UnanimousLength**: encrypted dumps cannot be compared, so peers must
//!   agree on the dump length; the primary peer's dump is returned
//! - **PassThroughList**: per-partition data (predictions), one entry per
//!   peer in topology order

use super::Outcome;
use crate::error::{DispatchError, STATUS_OK};

/// Merge function for one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReductionPolicy {
    StatusSum,
    UnanimousIdentity,
    UnanimousLength,
    PassThroughList,
}

impl ReductionPolicy {
    /// Reduce the replies of `expected` peers into one outcome
    ///
    /// `operation` names the call in errors.
    ///
    /// `responses` must be in peer-topology order. A reply count different
    /// from `expected` fails fast instead of reducing a partial list.
    pub fn reduce(
        &self,
        operation: &'static str,
        expected: usize,
        responses: Vec<Outcome>,
    ) -> Result<Outcome, DispatchError> {
        if responses.is_empty() {
            return Err(DispatchError::violation(format!(
                "no peer replies to reduce for {}",
                operation
            )));
        }
        if responses.len() != expected {
            return Err(DispatchError::QuorumDisagreement {
                operation,
                detail: format!("expected {} peer replies, got {}", expected, responses.len()),
            });
        }

        match self {
            ReductionPolicy::StatusSum => status_sum(operation, responses),
            ReductionPolicy::UnanimousIdentity => unanimous_identity(operation, responses),
            ReductionPolicy::UnanimousLength => unanimous_length(operation, responses),
            ReductionPolicy::PassThroughList => pass_through(operation, responses),
        }
    }
}

fn wrong_shape(operation: &'static str, peer: usize, got: &Outcome) -> DispatchError {
    DispatchError::violation(format!(
        "peer {} replied to {} with a {:?} payload",
        peer,
        operation,
        got.kind()
    ))
}

fn status_sum(operation: &'static str, responses: Vec<Outcome>) -> Result<Outcome, DispatchError> {
    let mut failed = Vec::new();
    for (peer, response) in responses.iter().enumerate() {
        match response {
            Outcome::Status(STATUS_OK) => {}
            Outcome::Status(code) => failed.push(format!("peer {} status {}", peer, code)),
            other => return Err(wrong_shape(operation, peer, other)),
        }
    }

    if failed.is_empty() {
        Ok(Outcome::Status(STATUS_OK))
    } else {
        Err(DispatchError::QuorumDisagreement {
            operation,
            detail: failed.join(", "),
        })
    }
}

fn unanimous_identity(operation: &'static str, responses: Vec<Outcome>) -> Result<Outcome, DispatchError> {
    let mut iter = responses.into_iter().enumerate();
    let (_, first) = iter.next().ok_or_else(|| DispatchError::violation("empty reply list"))?;

    match &first {
        Outcome::Name(_) | Outcome::Count(_) => {}
        other => return Err(wrong_shape(operation, 0, other)),
    }

    for (peer, response) in iter {
        if response.kind() != first.kind() {
            return Err(wrong_shape(operation, peer, &response));
        }
        if response != first {
            return Err(DispatchError::QuorumDisagreement {
                operation,
                detail: format!("peer {} returned {:?}, primary returned {:?}", peer, response, first),
            });
        }
    }

    Ok(first)
}

fn unanimous_length(operation: &'static str, responses: Vec<Outcome>) -> Result<Outcome, DispatchError> {
    let mut dumps = Vec::with_capacity(responses.len());
    for (peer, response) in responses.into_iter().enumerate() {
        match response {
            Outcome::Dump(dump) => dumps.push(dump),
            other => return Err(wrong_shape(operation, peer, &other)),
        }
    }

    let length = dumps[0].length;
    if let Some(peer) = dumps.iter().position(|d| d.length != length) {
        return Err(DispatchError::QuorumDisagreement {
            operation,
            detail: format!(
                "peer {} dumped {} entries, primary dumped {}",
                peer, dumps[peer].length, length
            ),
        });
    }

    Ok(Outcome::Dump(dumps.swap_remove(0)))
}

fn pass_through(operation: &'static str, responses: Vec<Outcome>) -> Result<Outcome, DispatchError> {
    // Entry i of the merged list belongs to peer i
    let mut merged = Vec::with_capacity(responses.len());
    for (peer, response) in responses.into_iter().enumerate() {
        match response {
            Outcome::Predictions(mut preds) if preds.len() == 1 => merged.append(&mut preds),
            Outcome::Predictions(preds) => {
                return Err(DispatchError::QuorumDisagreement {
                    operation,
                    detail: format!("peer {} returned {} predictions, expected 1", peer, preds.len()),
                })
            }
            other => return Err(wrong_shape(operation, peer, &other)),
        }
    }
    Ok(Outcome::Predictions(merged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{ModelDump, Operation, Prediction};

    fn counts(values: &[u64]) -> Vec<Outcome> {
        values.iter().map(|v| Outcome::Count(*v)).collect()
    }

    fn dump(length: u64, tag: u8) -> Outcome {
        Outcome::Dump(ModelDump {
            length,
            entries: vec![vec![tag; 4]; length as usize],
        })
    }

    #[test]
    fn test_status_sum_all_zero() {
        for k in 1..6 {
            let replies = vec![Outcome::Status(0); k];
            let merged = ReductionPolicy::StatusSum.reduce(Operation::SetParam.as_str(), k, replies).unwrap();
            assert_eq!(merged, Outcome::Status(0));
        }
    }

    #[test]
    fn test_status_sum_any_nonzero_fails() {
        let replies = vec![Outcome::Status(0), Outcome::Status(-1), Outcome::Status(0)];
        let err = ReductionPolicy::StatusSum.reduce(Operation::TrainStep.as_str(), 3, replies).unwrap_err();
        assert!(matches!(err, DispatchError::QuorumDisagreement { operation: "train-step", .. }));
    }

    #[test]
    fn test_status_sum_does_not_cancel_out() {
        // +1 and -1 sum to zero but both peers failed
        let replies = vec![Outcome::Status(1), Outcome::Status(-1)];
        assert!(ReductionPolicy::StatusSum.reduce(Operation::InitGroup.as_str(), 2, replies).is_err());
    }

    #[test]
    fn test_unanimous_counts_agree() {
        let merged = ReductionPolicy::UnanimousIdentity
            .reduce(Operation::RowCount.as_str(), 3, counts(&[100, 100, 100]))
            .unwrap();
        assert_eq!(merged, Outcome::Count(100));
    }

    #[test]
    fn test_unanimous_counts_disagree() {
        let err = ReductionPolicy::UnanimousIdentity
            .reduce(Operation::RowCount.as_str(), 3, counts(&[100, 100, 101]))
            .unwrap_err();
        assert!(matches!(err, DispatchError::QuorumDisagreement { .. }));
    }

    #[test]
    fn test_unanimous_names_are_byte_compared() {
        let same = vec![Outcome::Name("ctx-7".into()), Outcome::Name("ctx-7".into())];
        assert_eq!(
            ReductionPolicy::UnanimousIdentity.reduce(Operation::CreateContext.as_str(), 2, same).unwrap(),
            Outcome::Name("ctx-7".into())
        );

        let differ = vec![Outcome::Name("ctx-7".into()), Outcome::Name("ctx-7 ".into())];
        assert!(ReductionPolicy::UnanimousIdentity
            .reduce(Operation::CreateContext.as_str(), 2, differ)
            .is_err());
    }

    #[test]
    fn test_unanimous_length_returns_primary_dump() {
        let merged = ReductionPolicy::UnanimousLength
            .reduce(Operation::DumpModel.as_str(), 2, vec![dump(3, 1), dump(3, 2)])
            .unwrap();
        assert_eq!(merged, dump(3, 1));

        assert!(ReductionPolicy::UnanimousLength
            .reduce(Operation::DumpModel.as_str(), 2, vec![dump(3, 1), dump(4, 1)])
            .is_err());
    }

    #[test]
    fn test_pass_through_keeps_topology_order() {
        let pred = |tag: u8| Prediction { ciphertext: vec![tag], num_preds: tag as u64 };
        let replies = vec![
            Outcome::Predictions(vec![pred(0)]),
            Outcome::Predictions(vec![pred(1)]),
            Outcome::Predictions(vec![pred(2)]),
        ];
        let merged = ReductionPolicy::PassThroughList.reduce(Operation::Predict.as_str(), 3, replies).unwrap();
        assert_eq!(merged, Outcome::Predictions(vec![pred(0), pred(1), pred(2)]));
    }

    #[test]
    fn test_pass_through_requires_one_prediction_per_peer() {
        let pred = |tag: u8| Prediction { ciphertext: vec![tag], num_preds: 1 };

        let replies = vec![Outcome::Predictions(vec![]), Outcome::Predictions(vec![pred(1), pred(2)])];
        let err = ReductionPolicy::PassThroughList
            .reduce(Operation::Predict.as_str(), 2, replies)
            .unwrap_err();
        assert!(matches!(err, DispatchError::QuorumDisagreement { operation: "predict", .. }));

        let replies = vec![Outcome::Predictions(vec![pred(0)]), Outcome::Predictions(vec![pred(1), pred(2)])];
        assert!(ReductionPolicy::PassThroughList
            .reduce(Operation::Predict.as_str(), 2, replies)
            .is_err());
    }

    #[test]
    fn test_reply_count_mismatch_fails_fast() {
        let err = ReductionPolicy::UnanimousIdentity
            .reduce(Operation::ColCount.as_str(), 3, counts(&[7, 7]))
            .unwrap_err();
        assert!(matches!(err, DispatchError::QuorumDisagreement { .. }));
    }

    #[test]
    fn test_wrong_payload_shape_is_violation() {
        let replies = vec![Outcome::Status(0), Outcome::Name("x".into())];
        let err = ReductionPolicy::StatusSum.reduce(Operation::SaveModel.as_str(), 2, replies).unwrap_err();
        assert!(matches!(err, DispatchError::ProtocolViolation(_)));
    }
}
