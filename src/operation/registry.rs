//! Operation registry
//!
//! Static table mapping each `Operation` to its local handler, backend method
//! name, reply shape and reduction policy. The table is built once at startup
//! and only read afterwards; a missing entry is a startup error, never a
//! runtime condition.

use super::{Operation, Outcome, Params, ReductionPolicy, ReplyKind};
use crate::backend::ComputeBackend;
use crate::error::STATUS_OK;
use crate::Result;
use std::collections::HashMap;
use std::fmt;

/// Runs one operation against the local compute backend
pub type LocalHandler = fn(&dyn ComputeBackend, &Params) -> Result<Outcome>;

/// Everything the dispatcher needs to know about one operation
#[derive(Clone, Copy)]
pub struct OperationEntry {
    pub operation: Operation,
    /// Backend method name, only used in logs
    pub method: &'static str,
    pub reply: ReplyKind,
    pub reduction: ReductionPolicy,
    pub handler: LocalHandler,
}

impl fmt::Debug for OperationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationEntry")
            .field("operation", &self.operation)
            .field("method", &self.method)
            .field("reply", &self.reply)
            .field("reduction", &self.reduction)
            .finish_non_exhaustive()
    }
}

/// Append-only operation table
#[derive(Debug, Default)]
pub struct OperationRegistry {
    entries: HashMap<Operation, OperationEntry>,
}

impl OperationRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the standard entry of every operation
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for op in Operation::ALL {
            registry.entries.insert(op, standard_entry(op));
        }
        registry
    }

    /// Register an entry; an operation can be registered only once
    pub fn register(&mut self, entry: OperationEntry) -> Result<()> {
        if self.entries.contains_key(&entry.operation) {
            anyhow::bail!("operation {} is already registered", entry.operation);
        }
        self.entries.insert(entry.operation, entry);
        Ok(())
    }

    /// Check that every operation has an entry
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = Operation::ALL
            .iter()
            .filter(|op| !self.entries.contains_key(op))
            .map(|op| op.as_str())
            .collect();

        if !missing.is_empty() {
            anyhow::bail!("operation registry is missing: {}", missing.join(", "));
        }
        Ok(())
    }

    pub fn get(&self, operation: Operation) -> Option<&OperationEntry> {
        self.entries.get(&operation)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn mismatched(operation: Operation, params: &Params) -> Result<Outcome> {
    anyhow::bail!("{} handler received {} parameters", operation, params.operation())
}

fn entry(
    operation: Operation,
    method: &'static str,
    reply: ReplyKind,
    reduction: ReductionPolicy,
    handler: LocalHandler,
) -> OperationEntry {
    OperationEntry {
        operation,
        method,
        reply,
        reduction,
        handler,
    }
}

/// The built-in entry for `op`
pub fn standard_entry(op: Operation) -> OperationEntry {
    use ReductionPolicy::*;

    match op {
        Operation::CreateMatrix => entry(op, "matrix.create", ReplyKind::Name, UnanimousIdentity, |b, p| match p {
            Params::CreateMatrix(p) => b.create_matrix(p).map(Outcome::Name),
            other => mismatched(Operation::CreateMatrix, other),
        }),
        Operation::CreateContext => entry(op, "booster.create", ReplyKind::Name, UnanimousIdentity, |b, p| match p {
            Params::CreateContext(p) => b.create_context(p).map(Outcome::Name),
            other => mismatched(Operation::CreateContext, other),
        }),
        Operation::SetParam => entry(op, "booster.set_param", ReplyKind::Status, StatusSum, |b, p| match p {
            Params::SetParam(p) => b.set_param(p).map(|()| Outcome::Status(STATUS_OK)),
            other => mismatched(Operation::SetParam, other),
        }),
        Operation::TrainStep => entry(op, "booster.update_one_iter", ReplyKind::Status, StatusSum, |b, p| match p {
            Params::TrainStep(p) => b.train_step(p).map(|()| Outcome::Status(STATUS_OK)),
            other => mismatched(Operation::TrainStep, other),
        }),
        Operation::Predict => entry(op, "booster.predict", ReplyKind::Predictions, PassThroughList, |b, p| match p {
            // a leaf owns one partition, so it replies with a one-element list
            Params::Predict(p) => b.predict(p).map(|pred| Outcome::Predictions(vec![pred])),
            other => mismatched(Operation::Predict, other),
        }),
        Operation::SaveModel => entry(op, "booster.save_model", ReplyKind::Status, StatusSum, |b, p| match p {
            Params::SaveModel(p) => b.save_model(p).map(|()| Outcome::Status(STATUS_OK)),
            other => mismatched(Operation::SaveModel, other),
        }),
        Operation::LoadModel => entry(op, "booster.load_model", ReplyKind::Status, StatusSum, |b, p| match p {
            Params::LoadModel(p) => b.load_model(p).map(|()| Outcome::Status(STATUS_OK)),
            other => mismatched(Operation::LoadModel, other),
        }),
        Operation::DumpModel => entry(op, "booster.dump_model", ReplyKind::Dump, UnanimousLength, |b, p| match p {
            Params::DumpModel(p) => b.dump_model(p).map(Outcome::Dump),
            other => mismatched(Operation::DumpModel, other),
        }),
        Operation::DumpModelWithFeatures => {
            entry(op, "booster.dump_model_with_features", ReplyKind::Dump, UnanimousLength, |b, p| match p {
                Params::DumpModelWithFeatures(p) => b.dump_model_with_features(p).map(Outcome::Dump),
                other => mismatched(Operation::DumpModelWithFeatures, other),
            })
        }
        Operation::GetModel => entry(op, "booster.get_model_raw", ReplyKind::Dump, UnanimousLength, |b, p| match p {
            Params::GetModel(p) => b.get_model(p).map(Outcome::Dump),
            other => mismatched(Operation::GetModel, other),
        }),
        Operation::RowCount => entry(op, "matrix.num_row", ReplyKind::Count, UnanimousIdentity, |b, p| match p {
            Params::RowCount(m) => b.row_count(m).map(Outcome::Count),
            other => mismatched(Operation::RowCount, other),
        }),
        Operation::ColCount => entry(op, "matrix.num_col", ReplyKind::Count, UnanimousIdentity, |b, p| match p {
            Params::ColCount(m) => b.col_count(m).map(Outcome::Count),
            other => mismatched(Operation::ColCount, other),
        }),
        Operation::InitGroup => entry(op, "group.init", ReplyKind::Status, StatusSum, |b, p| match p {
            Params::InitGroup => b.init_group().map(|()| Outcome::Status(STATUS_OK)),
            other => mismatched(Operation::InitGroup, other),
        }),
        Operation::FinalizeGroup => entry(op, "group.finalize", ReplyKind::Status, StatusSum, |b, p| match p {
            Params::FinalizeGroup => b.finalize_group().map(|()| Outcome::Status(STATUS_OK)),
            other => mismatched(Operation::FinalizeGroup, other),
        }),
    }
}
