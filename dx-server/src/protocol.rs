//! Request and response bodies for the HTTP surface.

use serde::{Deserialize, Serialize};

pub use dx_model::DiagnosisList as DiagnoseResponse;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnoseRequest {
    pub symptoms: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub collection: String,
}
