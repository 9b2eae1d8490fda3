//! Mock backend for testing
//!
//! Implements every collaborator trait without an enclave. Handles are
//! deterministic (`DMatrix_0`, `Booster_1`, ...) so several mock nodes fed the
//! same call sequence agree on them, just like real enclaves do.
//!
//! # Features
//!
//! - Configurable row/column counts and dump length per node
//! - Partition tag stamped into predictions and reports
//! - Per-operation failure injection
//! - Thread-safe per-operation call counters
//!
//! # Example
//!
//! ```
//! use quorum_relay::backend::{ComputeBackend, mock::MockBackend};
//! use quorum_relay::operation::{MatrixRef, Operation};
//!
//! let backend = MockBackend::new().with_counts(100, 8);
//! let rows = backend.row_count(&MatrixRef { name: "DMatrix_0".into() }).unwrap();
//! assert_eq!(rows, 100);
//! assert_eq!(backend.calls(Operation::RowCount), 1);
//! ```

use super::{AttestationReport, Attestor, ClientKey, ComputeBackend, KeyStore};
use crate::operation::{
    ContextParams, DumpParams, DumpWithFeaturesParams, MatrixParams, MatrixRef, ModelDump,
    ModelFileParams, ModelRawParams, Operation, Prediction, PredictParams, SetParamParams,
    TrainStepParams,
};
use crate::Result;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// In-memory stand-in for an enclave node
#[derive(Clone)]
pub struct MockBackend {
    /// Tag identifying this node's data partition
    partition: u8,
    rows: u64,
    cols: u64,
    dump_length: u64,
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    next_handle: u64,
    calls: HashMap<Operation, usize>,
    failing: HashSet<Operation>,
    report_calls: usize,
    key_status: i32,
    installed_keys: Vec<ClientKey>,
}

impl MockBackend {
    /// Create a mock node with 0 rows, 0 columns and 2-entry dumps
    pub fn new() -> Self {
        Self {
            partition: 0,
            rows: 0,
            cols: 0,
            dump_length: 2,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn with_partition(mut self, partition: u8) -> Self {
        self.partition = partition;
        self
    }

    pub fn with_counts(mut self, rows: u64, cols: u64) -> Self {
        self.rows = rows;
        self.cols = cols;
        self
    }

    pub fn with_dump_length(mut self, length: u64) -> Self {
        self.dump_length = length;
        self
    }

    /// Make every later call of `operation` fail
    pub fn fail(&self, operation: Operation) {
        self.lock().failing.insert(operation);
    }

    /// Status code returned by later key installs
    pub fn set_key_status(&self, status: i32) {
        self.lock().key_status = status;
    }

    /// Number of times `operation` reached this backend
    pub fn calls(&self, operation: Operation) -> usize {
        self.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    /// Total number of compute calls across all operations
    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    pub fn report_calls(&self) -> usize {
        self.lock().report_calls
    }

    pub fn installed_keys(&self) -> Vec<ClientKey> {
        self.lock().installed_keys.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count one call and apply failure injection
    fn record(&self, operation: Operation) -> Result<MutexGuard<'_, MockState>> {
        let mut state = self.lock();
        *state.calls.entry(operation).or_insert(0) += 1;
        if state.failing.contains(&operation) {
            anyhow::bail!("mock failure injected for {}", operation);
        }
        Ok(state)
    }

    fn next_handle(&self, operation: Operation, prefix: &str) -> Result<String> {
        let mut state = self.record(operation)?;
        let handle = format!("{}_{}", prefix, state.next_handle);
        state.next_handle += 1;
        Ok(handle)
    }

    fn dump(&self, booster: &str) -> ModelDump {
        ModelDump {
            length: self.dump_length,
            entries: (0..self.dump_length)
                .map(|i| format!("{}:{}:tree-{}", self.partition, booster, i).into_bytes())
                .collect(),
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for MockBackend {
    fn create_matrix(&self, _params: &MatrixParams) -> Result<String> {
        self.next_handle(Operation::CreateMatrix, "DMatrix")
    }

    fn create_context(&self, _params: &ContextParams) -> Result<String> {
        self.next_handle(Operation::CreateContext, "Booster")
    }

    fn set_param(&self, _params: &SetParamParams) -> Result<()> {
        self.record(Operation::SetParam).map(drop)
    }

    fn train_step(&self, _params: &TrainStepParams) -> Result<()> {
        self.record(Operation::TrainStep).map(drop)
    }

    fn predict(&self, _params: &PredictParams) -> Result<Prediction> {
        self.record(Operation::Predict).map(drop)?;
        Ok(Prediction {
            ciphertext: vec![self.partition; 16],
            num_preds: self.rows,
        })
    }

    fn save_model(&self, _params: &ModelFileParams) -> Result<()> {
        self.record(Operation::SaveModel).map(drop)
    }

    fn load_model(&self, _params: &ModelFileParams) -> Result<()> {
        self.record(Operation::LoadModel).map(drop)
    }

    fn dump_model(&self, params: &DumpParams) -> Result<ModelDump> {
        self.record(Operation::DumpModel).map(drop)?;
        Ok(self.dump(&params.booster))
    }

    fn dump_model_with_features(&self, params: &DumpWithFeaturesParams) -> Result<ModelDump> {
        self.record(Operation::DumpModelWithFeatures).map(drop)?;
        Ok(self.dump(&params.booster))
    }

    fn get_model(&self, params: &ModelRawParams) -> Result<ModelDump> {
        self.record(Operation::GetModel).map(drop)?;
        Ok(self.dump(&params.booster))
    }

    fn row_count(&self, _matrix: &MatrixRef) -> Result<u64> {
        self.record(Operation::RowCount).map(drop)?;
        Ok(self.rows)
    }

    fn col_count(&self, _matrix: &MatrixRef) -> Result<u64> {
        self.record(Operation::ColCount).map(drop)?;
        Ok(self.cols)
    }

    fn init_group(&self) -> Result<()> {
        self.record(Operation::InitGroup).map(drop)
    }

    fn finalize_group(&self) -> Result<()> {
        self.record(Operation::FinalizeGroup).map(drop)
    }
}

impl Attestor for MockBackend {
    fn report_with_public_key(&self) -> Result<AttestationReport> {
        self.lock().report_calls += 1;
        Ok(AttestationReport {
            public_key: format!("-----BEGIN PUBLIC KEY----- mock-{}", self.partition).into_bytes(),
            report: vec![self.partition; 32],
        })
    }
}

impl KeyStore for MockBackend {
    fn install_client_key(&self, key: &ClientKey) -> Result<i32> {
        let mut state = self.lock();
        state.installed_keys.push(key.clone());
        Ok(state.key_status)
    }
}
