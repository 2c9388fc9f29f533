//! Diagnosis types and validation of the model's reply.
//!
//! The field names below are shared with [`crate::prompt`], which spells out
//! the same JSON shape in the system instruction.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Top-level key holding the candidate array.
pub const DIAGNOSES_KEY: &str = "diagnoses";
/// Candidate field: rank, 1 = most likely.
pub const RANK_FIELD: &str = "rank";
/// Candidate field: ICD-10 code.
pub const CODE_FIELD: &str = "icd10_code";
/// Candidate field: diagnosis name.
pub const NAME_FIELD: &str = "name";
/// Candidate field: short justification.
pub const EXPLANATION_FIELD: &str = "explanation";
/// Number of candidates the model is asked for, and the most ever returned.
pub const MAX_CANDIDATES: usize = 3;

/// One ranked diagnosis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagnosisCandidate {
    pub rank: u8,
    #[serde(rename = "icd10_code")]
    pub code: String,
    pub name: String,
    pub explanation: String,
}

/// The `{"diagnoses": [...]}` envelope used on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagnosisList {
    pub diagnoses: Vec<DiagnosisCandidate>,
}

impl DiagnosisList {
    pub fn empty() -> Self {
        Self::default()
    }
}

impl From<Vec<DiagnosisCandidate>> for DiagnosisList {
    fn from(diagnoses: Vec<DiagnosisCandidate>) -> Self {
        Self { diagnoses }
    }
}

fn code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z][0-9]{2}(\.[0-9])?$").expect("valid regex"))
}

/// Whether `code` looks like an ICD-10 code: a letter, two digits, and an
/// optional `.digit` subcategory (`J11`, `J11.1`).
pub fn is_valid_code(code: &str) -> bool {
    code_pattern().is_match(code)
}

/// Remove markdown code fences the model may wrap its JSON in.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`, `JSON`, ...) on the opening fence line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Find the first fenced block anywhere in `text`, e.g. after a line of prose.
fn fenced_block(text: &str) -> Option<&str> {
    let start_markers = ["```json\n", "```json\r\n", "```\n", "```\r\n"];
    for start in start_markers {
        if let Some(start_idx) = text.find(start) {
            let content_start = start_idx + start.len();
            if let Some(end_idx) = text[content_start..].find("```") {
                return Some(text[content_start..content_start + end_idx].trim());
            }
        }
    }
    None
}

fn extract_json(raw: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(strip_code_fences(raw)).or_else(|e| match fenced_block(raw) {
        Some(block) => serde_json::from_str(block),
        None => Err(e),
    })
}

/// Parse the model's reply into at most [`MAX_CANDIDATES`] diagnoses.
///
/// The reply may be bare JSON, fenced JSON, or prose with a fenced block.
/// Never fails: text that is not JSON, or JSON of the wrong shape, yields an
/// empty list. If the reply parses but lacks the `diagnoses` key, the whole
/// value is treated as the diagnoses value. Individual candidates with a
/// missing field, a rank outside `1..=3` or a malformed code are dropped.
/// Survivors are ordered by rank, and only the first candidate given for a
/// rank is kept.
pub fn parse_diagnoses(raw: &str) -> Vec<DiagnosisCandidate> {
    let value = match extract_json(raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, reply_len = raw.len(), "model reply is not valid JSON");
            return Vec::new();
        }
    };

    let diagnoses = match value {
        Value::Object(mut map) if map.contains_key(DIAGNOSES_KEY) => {
            map.remove(DIAGNOSES_KEY).unwrap_or(Value::Null)
        }
        other => {
            debug!("model reply lacks '{DIAGNOSES_KEY}' key, treating whole value as the list");
            other
        }
    };

    let Value::Array(items) = diagnoses else {
        warn!("'{DIAGNOSES_KEY}' is not an array");
        return Vec::new();
    };

    let mut candidates: Vec<DiagnosisCandidate> = items
        .iter()
        .filter_map(|item| {
            let candidate = candidate_from_value(item);
            if candidate.is_none() {
                warn!(candidate = %item, "dropping malformed diagnosis candidate");
            }
            candidate
        })
        .collect();

    // Stable sort: among equal ranks the model's first answer comes first and is kept.
    candidates.sort_by_key(|c| c.rank);
    let before = candidates.len();
    candidates.dedup_by_key(|c| c.rank);
    if candidates.len() < before {
        warn!(dropped = before - candidates.len(), "dropping candidates with a repeated rank");
    }
    candidates.truncate(MAX_CANDIDATES);
    candidates
}

fn candidate_from_value(value: &Value) -> Option<DiagnosisCandidate> {
    let object = value.as_object()?;

    let rank = match object.get(RANK_FIELD)? {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    if !(1..=MAX_CANDIDATES as u64).contains(&rank) {
        return None;
    }

    let code = object.get(CODE_FIELD)?.as_str()?.trim().to_uppercase();
    if !is_valid_code(&code) {
        return None;
    }

    let name = object.get(NAME_FIELD)?.as_str()?.trim().to_string();
    let explanation = object
        .get(EXPLANATION_FIELD)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    Some(DiagnosisCandidate { rank: rank as u8, code, name, explanation })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_reply() {
        let raw = "```json\n{\"diagnoses\":[{\"rank\":1,\"icd10_code\":\"J11.1\",\"name\":\"Influenza\",\"explanation\":\"fever, cough\"}]}\n```";
        let parsed = parse_diagnoses(raw);
        assert_eq!(
            parsed,
            vec![DiagnosisCandidate {
                rank: 1,
                code: "J11.1".into(),
                name: "Influenza".into(),
                explanation: "fever, cough".into(),
            }]
        );
    }

    #[test]
    fn non_json_is_empty() {
        assert!(parse_diagnoses("not json at all").is_empty());
        assert!(parse_diagnoses("").is_empty());
        assert!(parse_diagnoses("```json\n{broken\n```").is_empty());
    }

    #[test]
    fn finds_fenced_block_after_prose() {
        let raw = "Here is the result:\n```json\n[{\"rank\":1,\"icd10_code\":\"I10\",\"name\":\"Hypertension\",\"explanation\":\"\"}]\n```\nThanks.";
        let parsed = parse_diagnoses(raw);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].code, "I10");
    }

    #[test]
    fn bare_array_is_wrapped() {
        let raw = r#"[{"rank":2,"icd10_code":"R51","name":"Headache","explanation":"x"},
                      {"rank":1,"icd10_code":"G43.0","name":"Migraine","explanation":"y"}]"#;
        let parsed = parse_diagnoses(raw);
        let codes: Vec<&str> = parsed.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["G43.0", "R51"]);
    }

    #[test]
    fn object_without_key_is_wrapped_then_rejected_by_shape() {
        assert!(parse_diagnoses(r#"{"rank":1,"icd10_code":"J11.1","name":"Flu"}"#).is_empty());
        assert!(parse_diagnoses(r#"{"diagnoses": "J11.1"}"#).is_empty());
    }

    #[test]
    fn drops_malformed_candidates_and_caps_at_three() {
        let raw = r#"{"diagnoses":[
            {"rank":1,"icd10_code":"Код J11.1","name":"Flu","explanation":""},
            {"rank":"1","icd10_code":"j11.1","name":"Flu","explanation":"ok"},
            {"rank":2,"icd10_code":"J06.9","name":"URTI"},
            {"rank":3,"icd10_code":"J20","name":"Bronchitis","explanation":"cough"},
            {"rank":4,"icd10_code":"J18.9","name":"Pneumonia","explanation":"too many"},
            {"rank":3,"icd10_code":"J45.9"},
            "J18.9"
        ]}"#;
        let parsed = parse_diagnoses(raw);
        let codes: Vec<&str> = parsed.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["J11.1", "J06.9", "J20"]);
        assert_eq!(parsed[1].explanation, "");
    }

    #[test]
    fn repeated_ranks_keep_the_first_answer() {
        let raw = r#"{"diagnoses":[
            {"rank":1,"icd10_code":"J11.1","name":"Influenza","explanation":""},
            {"rank":1,"icd10_code":"J06.9","name":"URTI","explanation":""},
            {"rank":1,"icd10_code":"J20.9","name":"Bronchitis","explanation":""},
            {"rank":2,"icd10_code":"J18.9","name":"Pneumonia","explanation":""}
        ]}"#;
        let parsed = parse_diagnoses(raw);
        let ranked: Vec<(u8, &str)> = parsed.iter().map(|c| (c.rank, c.code.as_str())).collect();
        assert_eq!(ranked, vec![(1, "J11.1"), (2, "J18.9")]);
    }

    #[test]
    fn accepts_only_icd10_shapes() {
        for ok in ["A00", "J11.1", "U09.9", "F32.0"] {
            assert!(is_valid_code(ok), "{ok}");
        }
        for bad in ["", "J1", "J11.", "J11.12", "11.1", "JJ1.1", "J11-1"] {
            assert!(!is_valid_code(bad), "{bad}");
        }
    }

    #[test]
    fn strips_fence_variants() {
        assert_eq!(strip_code_fences("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("```\n[]\n```"), "[]");
        assert_eq!(strip_code_fences("```json{}```"), "{}");
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn wire_format_uses_icd10_code() {
        let list = DiagnosisList::from(vec![DiagnosisCandidate {
            rank: 1,
            code: "J11.1".into(),
            name: "Influenza".into(),
            explanation: "fever".into(),
        }]);
        let json = serde_json::to_value(&list).unwrap();
        assert_eq!(json["diagnoses"][0]["icd10_code"], "J11.1");
        assert_eq!(serde_json::to_string(&DiagnosisList::empty()).unwrap(), r#"{"diagnoses":[]}"#);
    }
}
