//! Operations
//!
//! An `Operation` names one remote call that every participant must submit
//! before it runs. Its parameters travel as `Params` (one variant per
//! operation) and its result as an `Outcome`.
//!
//! # Modules
//!
//! - `params`: typed parameters for each operation
//! - `registry`: per-operation handler, reply shape and reduction policy
//! - `reduction`: merging of per-peer replies into one result

pub mod params;
pub mod reduction;
pub mod registry;

pub use params::*;
pub use reduction::ReductionPolicy;
pub use registry::{OperationEntry, OperationRegistry};

use serde::{Deserialize, Serialize};
use std::fmt;

/// A barriered remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    /// Load an encrypted data matrix
    CreateMatrix,
    /// Create a training context (booster)
    CreateContext,
    /// Set a training parameter
    SetParam,
    /// Run one boosting iteration
    TrainStep,
    /// Encrypted predictions, one set per data partition
    Predict,
    /// Save the model to an encrypted file
    SaveModel,
    /// Load the model from an encrypted file
    LoadModel,
    /// Encrypted model dump
    DumpModel,
    /// Encrypted model dump with feature names and types
    DumpModelWithFeatures,
    /// Encrypted raw model
    GetModel,
    /// Number of rows in a matrix
    RowCount,
    /// Number of columns in a matrix
    ColCount,
    /// Join the allreduce group
    InitGroup,
    /// Leave the allreduce group
    FinalizeGroup,
}

impl Operation {
    /// Every operation, in declaration order
    pub const ALL: [Operation; 14] = [
        Operation::CreateMatrix,
        Operation::CreateContext,
        Operation::SetParam,
        Operation::TrainStep,
        Operation::Predict,
        Operation::SaveModel,
        Operation::LoadModel,
        Operation::DumpModel,
        Operation::DumpModelWithFeatures,
        Operation::GetModel,
        Operation::RowCount,
        Operation::ColCount,
        Operation::InitGroup,
        Operation::FinalizeGroup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateMatrix => "create-matrix",
            Operation::CreateContext => "create-context",
            Operation::SetParam => "set-param",
            Operation::TrainStep => "train-step",
            Operation::Predict => "predict",
            Operation::SaveModel => "save-model",
            Operation::LoadModel => "load-model",
            Operation::DumpModel => "dump-model",
            Operation::DumpModelWithFeatures => "dump-model-with-features",
            Operation::GetModel => "get-model",
            Operation::RowCount => "row-count",
            Operation::ColCount => "col-count",
            Operation::InitGroup => "init-group",
            Operation::FinalizeGroup => "finalize-group",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of the payload an operation replies with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Status,
    Name,
    Count,
    Dump,
    Predictions,
}

/// Encrypted model dump
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDump {
    /// Number of entries the enclave reported
    pub length: u64,
    /// Encrypted dump entries
    pub entries: Vec<Vec<u8>>,
}

/// Encrypted predictions for one data partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub ciphertext: Vec<u8>,
    pub num_preds: u64,
}

/// Result payload of one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Status(i32),
    Name(String),
    Count(u64),
    Dump(ModelDump),
    Predictions(Vec<Prediction>),
}

impl Outcome {
    pub fn kind(&self) -> ReplyKind {
        match self {
            Outcome::Status(_) => ReplyKind::Status,
            Outcome::Name(_) => ReplyKind::Name,
            Outcome::Count(_) => ReplyKind::Count,
            Outcome::Dump(_) => ReplyKind::Dump,
            Outcome::Predictions(_) => ReplyKind::Predictions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_names_are_unique() {
        let mut names: Vec<&str> = Operation::ALL.iter().map(|op| op.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), Operation::ALL.len());
    }

    #[test]
    fn test_display_matches_serde_name() {
        // serde kebab-case and as_str() must agree, logs and configs use both
        for op in Operation::ALL {
            let encoded = ::toml::Value::try_from(op).unwrap();
            assert_eq!(encoded.as_str(), Some(op.as_str()));
        }
    }

    #[test]
    fn test_outcome_kind() {
        assert_eq!(Outcome::Status(0).kind(), ReplyKind::Status);
        assert_eq!(Outcome::Count(3).kind(), ReplyKind::Count);
        assert_eq!(Outcome::Predictions(vec![]).kind(), ReplyKind::Predictions);
    }
}
