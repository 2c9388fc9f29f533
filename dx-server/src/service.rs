//! Retrieve → prompt → complete → validate, per request.

use std::sync::Arc;

use dx_model::{ChatModel, DiagnosisCandidate, PromptAssembler, parse_diagnoses};
use dx_rag::Retriever;
use tracing::{info, warn};

/// Default number of chunks retrieved per request.
pub const DEFAULT_TOP_K: usize = 2;

/// Composes retrieval, prompt assembly, the chat model and reply validation.
///
/// Built once at startup and shared read-only across requests.
pub struct DiagnosisService {
    retriever: Retriever,
    assembler: PromptAssembler,
    model: Arc<dyn ChatModel>,
    top_k: usize,
}

impl std::fmt::Debug for DiagnosisService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosisService")
            .field("retriever", &self.retriever)
            .field("model", &self.model.name())
            .field("top_k", &self.top_k)
            .finish_non_exhaustive()
    }
}

impl DiagnosisService {
    pub fn new(retriever: Retriever, assembler: PromptAssembler, model: Arc<dyn ChatModel>) -> Self {
        Self { retriever, assembler, model, top_k: DEFAULT_TOP_K }
    }

    /// Number of chunks to retrieve; values below 1 are raised to 1.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Produce up to three ranked diagnoses for `symptoms`.
    ///
    /// Never fails. Retrieval, model and validation failures are logged with
    /// the stage and the query, and yield an empty list.
    pub async fn diagnose(&self, symptoms: &str) -> Vec<DiagnosisCandidate> {
        let symptoms = symptoms.trim();
        if symptoms.is_empty() {
            warn!(stage = "input", "empty symptoms, nothing to diagnose");
            return Vec::new();
        }

        let results = match self.retriever.query(symptoms, self.top_k).await {
            Ok(results) => results,
            Err(e) => {
                warn!(stage = "retrieval", symptoms, error = %e, "diagnosis failed");
                return Vec::new();
            }
        };

        let prompt = self.assembler.assemble(&results, symptoms);
        let reply = match self.model.complete(&prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(stage = "model", symptoms, model = self.model.name(), error = %e, "diagnosis failed");
                return Vec::new();
            }
        };

        let diagnoses = parse_diagnoses(&reply);
        if diagnoses.is_empty() {
            warn!(stage = "validation", symptoms, reply = %reply, "no valid diagnoses in model reply");
        } else {
            info!(
                retrieved = results.len(),
                codes = ?diagnoses.iter().map(|d| d.code.as_str()).collect::<Vec<_>>(),
                "diagnosis complete"
            );
        }
        diagnoses
    }
}
