//! Collaborator interfaces
//!
//! The relay never performs the training computation, the attestation or the
//! key handling itself. A leaf node calls into these traits; an orchestrator
//! never does (it forwards to its peers instead).
//!
//! Implementations must be `Send + Sync`: handlers run on blocking worker
//! threads and the same backend instance serves every request.

pub mod mock;

use crate::operation::{
    ContextParams, DumpParams, DumpWithFeaturesParams, MatrixParams, MatrixRef, ModelDump,
    ModelFileParams, ModelRawParams, Prediction, PredictParams, SetParamParams, TrainStepParams,
};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Per-operation compute handlers
///
/// Each method is an opaque call into the computation layer. Errors are
/// reported to callers as `OperationFailed`.
pub trait ComputeBackend: Send + Sync {
    /// Load an encrypted matrix, returning its handle
    fn create_matrix(&self, params: &MatrixParams) -> Result<String>;

    /// Create a training context, returning its handle
    fn create_context(&self, params: &ContextParams) -> Result<String>;

    fn set_param(&self, params: &SetParamParams) -> Result<()>;

    fn train_step(&self, params: &TrainStepParams) -> Result<()>;

    /// Encrypted predictions over this node's partition
    fn predict(&self, params: &PredictParams) -> Result<Prediction>;

    fn save_model(&self, params: &ModelFileParams) -> Result<()>;

    fn load_model(&self, params: &ModelFileParams) -> Result<()>;

    fn dump_model(&self, params: &DumpParams) -> Result<ModelDump>;

    fn dump_model_with_features(&self, params: &DumpWithFeaturesParams) -> Result<ModelDump>;

    fn get_model(&self, params: &ModelRawParams) -> Result<ModelDump>;

    fn row_count(&self, matrix: &MatrixRef) -> Result<u64>;

    fn col_count(&self, matrix: &MatrixRef) -> Result<u64>;

    fn init_group(&self) -> Result<()>;

    fn finalize_group(&self) -> Result<()>;
}

/// Attestation report bound to the enclave's public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationReport {
    /// PEM-encoded public key
    pub public_key: Vec<u8>,
    /// Opaque report blob, never inspected by the relay
    pub report: Vec<u8>,
}

/// Source of attestation reports
pub trait Attestor: Send + Sync {
    fn report_with_public_key(&self) -> Result<AttestationReport>;
}

/// Encrypted symmetric key sent by a data owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientKey {
    /// Owner certificate, when the key is provisioned with one
    #[serde(default)]
    pub certificate: Option<Vec<u8>>,
    /// Symmetric key encrypted with the enclave's public key
    pub encrypted_key: Vec<u8>,
    /// Owner signature over `encrypted_key`
    pub signature: Vec<u8>,
}

/// Installs provisioned client keys
pub trait KeyStore: Send + Sync {
    /// Install a client key, returning the enclave status code (0 on success)
    fn install_client_key(&self, key: &ClientKey) -> Result<i32>;
}

/// The three collaborators a node is built with
#[derive(Clone)]
pub struct Collaborators {
    pub compute: Arc<dyn ComputeBackend>,
    pub attestor: Arc<dyn Attestor>,
    pub keys: Arc<dyn KeyStore>,
}

impl Collaborators {
    /// Use one backend for computation, attestation and keys
    pub fn from_backend<B>(backend: B) -> Self
    where
        B: ComputeBackend + Attestor + KeyStore + 'static,
    {
        let backend = Arc::new(backend);
        Self {
            compute: backend.clone(),
            attestor: backend.clone(),
            keys: backend,
        }
    }
}
