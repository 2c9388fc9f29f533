//! Prompt assembly: retrieved protocol text plus patient symptoms.

use dx_rag::SearchResult;
use serde::{Deserialize, Serialize};

use crate::diagnosis::{
    CODE_FIELD, DIAGNOSES_KEY, EXPLANATION_FIELD, MAX_CANDIDATES, NAME_FIELD, RANK_FIELD,
};

/// Default cap on the joined context, in characters.
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 4000;
/// Default separator between retrieved chunks.
pub const DEFAULT_SEPARATOR: &str = "\n---\n";

const CONTEXT_BEGIN: &str = "--- НАЧАЛО КЛИНИЧЕСКИХ ПРОТОКОЛОВ ---";
const CONTEXT_END: &str = "--- КОНЕЦ КЛИНИЧЕСКИХ ПРОТОКОЛОВ ---";
const SYMPTOMS_HEADER: &str = "СИМПТОМЫ ПАЦИЕНТА:";

/// A two-part chat prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Builds the system instruction and user message sent to the chat model.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    max_context_chars: usize,
    separator: String,
    system_instruction: String,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self {
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
            separator: DEFAULT_SEPARATOR.to_string(),
            system_instruction: default_system_instruction(),
        }
    }
}

impl PromptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_context_chars(mut self, max_context_chars: usize) -> Self {
        self.max_context_chars = max_context_chars;
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn max_context_chars(&self) -> usize {
        self.max_context_chars
    }

    /// Join the retrieved chunk texts in order, then cut the joined string to
    /// at most `max_context_chars` characters.
    pub fn context(&self, results: &[SearchResult]) -> String {
        let joined =
            results.iter().map(|r| r.document.as_str()).collect::<Vec<_>>().join(&self.separator);
        match joined.char_indices().nth(self.max_context_chars) {
            Some((cut, _)) => joined[..cut].to_string(),
            None => joined,
        }
    }

    /// Assemble the prompt for `query` from retrieval `results`.
    pub fn assemble(&self, results: &[SearchResult], query: &str) -> Prompt {
        let context = self.context(results);
        let user = format!(
            "{CONTEXT_BEGIN}\n{context}\n{CONTEXT_END}\n\n{SYMPTOMS_HEADER}\n{query}\n\n\
             Based on the protocols above, provide the top {MAX_CANDIDATES} diagnoses in the \
             requested JSON format."
        );
        Prompt { system: self.system_instruction.clone(), user }
    }
}

fn default_system_instruction() -> String {
    let example_rows = (1..=MAX_CANDIDATES)
        .map(|rank| {
            format!(
                "    {{\"{RANK_FIELD}\": {rank}, \"{CODE_FIELD}\": \"...\", \"{NAME_FIELD}\": \"...\", \"{EXPLANATION_FIELD}\": \"...\"}}"
            )
        })
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        "You are an expert clinical diagnostician.\n\
         Given a patient's symptoms (in Russian) and relevant clinical protocol text, determine \
         the top {MAX_CANDIDATES} most likely diagnoses.\n\
         \n\
         CRITICAL RULES:\n\
         1. Act as a doctor. Diagnose the patient based on the clinical picture. The protocol \
         text is just context to guide you.\n\
         2. Provide the EXACT 4-character ICD-10 code (МКБ-10) for each diagnosis, including \
         the subcategory digit (e.g. \"F32.0\", \"U09.9\").\n\
         3. Use your own medical knowledge of ICD-10 to select the subcategory that matches \
         the symptom severity.\n\
         4. Output ONLY the raw code in the '{CODE_FIELD}' field (no extra words like \"Код\").\n\
         5. Rank 1 MUST be your best primary diagnosis. Pay attention to the patient's primary \
         complaint.\n\
         6. Keep explanations extremely short (under 10 words in Russian).\n\
         \n\
         Return EXACTLY this JSON structure and nothing else:\n\
         {{\n  \"{DIAGNOSES_KEY}\": [\n{example_rows}\n  ]\n}}"
    )
}
