//! `dx-server` exposes retrieval-augmented diagnosis over HTTP:
//! `POST /diagnose` returns up to three ranked ICD-10 codes for free-text symptoms.

pub mod protocol;
pub mod server;
pub mod service;

pub use server::{AppState, ServerConfig, app_router, run_server};
pub use service::{DEFAULT_TOP_K, DiagnosisService};
