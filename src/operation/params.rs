//! Typed operation parameters
//!
//! All participants are expected to submit equivalent parameters for a round;
//! the barrier keeps the first submitter's set.

use super::Operation;
use serde::{Deserialize, Serialize};

/// Load an encrypted matrix from per-user files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixParams {
    pub filenames: Vec<String>,
    pub usernames: Vec<String>,
    #[serde(default)]
    pub silent: bool,
}

/// Create a training context over cached matrices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextParams {
    /// Matrix handles to cache
    pub cache: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetParamParams {
    pub booster: String,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainStepParams {
    pub booster: String,
    pub dtrain: String,
    pub iteration: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictParams {
    pub booster: String,
    pub dmatrix: String,
    #[serde(default)]
    pub option_mask: i32,
    #[serde(default)]
    pub ntree_limit: u32,
    /// User whose key encrypts the predictions
    pub username: String,
}

/// Save or load a model file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFileParams {
    pub booster: String,
    pub filename: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpParams {
    pub booster: String,
    #[serde(default)]
    pub fmap: String,
    #[serde(default)]
    pub with_stats: bool,
    pub dump_format: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpWithFeaturesParams {
    pub booster: String,
    pub feature_names: Vec<String>,
    pub feature_types: Vec<String>,
    #[serde(default)]
    pub with_stats: bool,
    pub dump_format: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRawParams {
    pub booster: String,
    pub username: String,
}

/// Reference to a loaded matrix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixRef {
    pub name: String,
}

/// Parameters of one operation call
///
/// The variant determines the operation; see [`Params::operation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Params {
    CreateMatrix(MatrixParams),
    CreateContext(ContextParams),
    SetParam(SetParamParams),
    TrainStep(TrainStepParams),
    Predict(PredictParams),
    SaveModel(ModelFileParams),
    LoadModel(ModelFileParams),
    DumpModel(DumpParams),
    DumpModelWithFeatures(DumpWithFeaturesParams),
    GetModel(ModelRawParams),
    RowCount(MatrixRef),
    ColCount(MatrixRef),
    InitGroup,
    FinalizeGroup,
}

impl Params {
    pub fn operation(&self) -> Operation {
        match self {
            Params::CreateMatrix(_) => Operation::CreateMatrix,
            Params::CreateContext(_) => Operation::CreateContext,
            Params::SetParam(_) => Operation::SetParam,
            Params::TrainStep(_) => Operation::TrainStep,
            Params::Predict(_) => Operation::Predict,
            Params::SaveModel(_) => Operation::SaveModel,
            Params::LoadModel(_) => Operation::LoadModel,
            Params::DumpModel(_) => Operation::DumpModel,
            Params::DumpModelWithFeatures(_) => Operation::DumpModelWithFeatures,
            Params::GetModel(_) => Operation::GetModel,
            Params::RowCount(_) => Operation::RowCount,
            Params::ColCount(_) => Operation::ColCount,
            Params::InitGroup => Operation::InitGroup,
            Params::FinalizeGroup => Operation::FinalizeGroup,
        }
    }
}
