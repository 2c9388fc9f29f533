//! # dx-model
//!
//! The generation side of diagnosis: prompt assembly from retrieved protocol
//! text, a chat-completions client, and validation of the model's JSON reply
//! into ranked ICD-10 candidates.

pub mod client;
pub mod config;
pub mod diagnosis;
pub mod error;
pub mod prompt;

pub use client::{ChatModel, OpenAICompatibleClient, extract_content};
pub use config::ModelConfig;
pub use diagnosis::{
    DiagnosisCandidate, DiagnosisList, MAX_CANDIDATES, is_valid_code, parse_diagnoses,
    strip_code_fences,
};
pub use error::{ModelError, Result};
pub use prompt::{Prompt, PromptAssembler};
