//! Protocol corpus loading.
//!
//! Two on-disk shapes are supported, selected explicitly through
//! [`CorpusSource`]:
//!
//! - **Directory**: one JSON object per `*.json` file with the fields
//!   `protocol_id`, `title`, `text` and `icd_codes`. Files with any other
//!   extension are ignored, but a file that is included and fails to decode
//!   aborts the whole load.
//! - **JSON lines**: one object per line with `id`, `text` and a ground-truth
//!   label in `gt` or `icd_code`. Blank lines are skipped; a malformed line
//!   aborts the load.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::document::ProtocolRecord;
use crate::error::{RagError, Result};

/// Ground-truth label used when a JSON lines record carries none.
pub const UNKNOWN_GROUND_TRUTH: &str = "unknown";

/// The on-disk corpus format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorpusFormat {
    /// A directory of `*.json` files.
    Directory,
    /// A single `*.jsonl` file.
    JsonLines,
}

impl FromStr for CorpusFormat {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dir" | "directory" => Ok(Self::Directory),
            "jsonl" | "json-lines" => Ok(Self::JsonLines),
            other => Err(RagError::ConfigError(format!(
                "unknown corpus format '{other}' (expected 'dir' or 'jsonl')"
            ))),
        }
    }
}

impl fmt::Display for CorpusFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory => f.write_str("dir"),
            Self::JsonLines => f.write_str("jsonl"),
        }
    }
}

/// Where and how to read the corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusSource {
    pub format: CorpusFormat,
    pub path: PathBuf,
}

impl CorpusSource {
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self { format: CorpusFormat::Directory, path: path.into() }
    }

    pub fn json_lines(path: impl Into<PathBuf>) -> Self {
        Self { format: CorpusFormat::JsonLines, path: path.into() }
    }
}

/// Load every protocol record from `source`, in a deterministic order.
///
/// # Errors
///
/// - [`RagError::CorpusNotFound`] if the directory or file does not exist.
/// - [`RagError::CorpusParseError`] on the first file or line that fails to decode.
pub fn load(source: &CorpusSource) -> Result<Vec<ProtocolRecord>> {
    if !source.path.exists() {
        return Err(RagError::CorpusNotFound { path: source.path.clone() });
    }

    let records = match source.format {
        CorpusFormat::Directory => load_directory(&source.path)?,
        CorpusFormat::JsonLines => load_json_lines(&source.path)?,
    };
    info!(
        path = %source.path.display(),
        format = %source.format,
        records = records.len(),
        "loaded protocol corpus"
    );
    Ok(records)
}

#[derive(Deserialize)]
struct ProtocolFile {
    protocol_id: Option<Value>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    icd_codes: Option<Vec<String>>,
}

fn load_directory(dir: &Path) -> Result<Vec<ProtocolRecord>> {
    if !dir.is_dir() {
        return Err(RagError::CorpusNotFound { path: dir.to_path_buf() });
    }

    let mut files = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "json"))
        .map(|entry| entry.into_path())
        .collect::<Vec<_>>();
    files.sort();

    let mut records = Vec::with_capacity(files.len());
    for path in files {
        let raw = std::fs::read_to_string(&path)?;
        let parsed: ProtocolFile =
            serde_json::from_str(&raw).map_err(|e| RagError::CorpusParseError {
                path: path.clone(),
                line: None,
                message: e.to_string(),
            })?;

        let file_name =
            path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let id = parsed.protocol_id.as_ref().map(value_to_string).unwrap_or(file_name);

        debug!(protocol_id = %id, path = %path.display(), "read protocol file");
        records.push(ProtocolRecord {
            id,
            title: parsed.title.filter(|t| !t.is_empty()),
            text: parsed.text.unwrap_or_default(),
            codes: parsed.icd_codes.unwrap_or_default(),
            ground_truth: None,
        });
    }
    Ok(records)
}

fn load_json_lines(file: &Path) -> Result<Vec<ProtocolRecord>> {
    if !file.is_file() {
        return Err(RagError::CorpusNotFound { path: file.to_path_buf() });
    }

    let raw = std::fs::read_to_string(file)?;
    let mut records = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let value: Value = serde_json::from_str(line).map_err(|e| RagError::CorpusParseError {
            path: file.to_path_buf(),
            line: Some(index + 1),
            message: e.to_string(),
        })?;
        records.push(record_from_line(index, value));
    }
    Ok(records)
}

/// Normalize one JSON lines object. `index` is the zero-based line number and
/// names records that carry no `id`.
fn record_from_line(index: usize, value: Value) -> ProtocolRecord {
    let id = value
        .get("id")
        .filter(|v| !v.is_null())
        .map(value_to_string)
        .unwrap_or_else(|| format!("protocol_{index}"));

    let text = match value.get("text") {
        Some(Value::String(text)) => text.clone(),
        Some(other) if !other.is_null() => other.to_string(),
        _ => value.to_string(),
    };

    let ground_truth = ["gt", "icd_code"]
        .iter()
        .find_map(|key| value.get(*key).filter(|v| !v.is_null()))
        .map(value_to_string)
        .unwrap_or_else(|| UNKNOWN_GROUND_TRUTH.to_string());

    let codes = if ground_truth == UNKNOWN_GROUND_TRUTH {
        Vec::new()
    } else {
        vec![ground_truth.clone()]
    };

    let title = value.get("title").and_then(Value::as_str).map(str::to_string);

    ProtocolRecord { id, title, text, codes, ground_truth: Some(ground_truth) }
}

/// Render a JSON scalar as a plain string (no quotes around strings).
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn directory_mode_reads_only_json_files_in_sorted_order() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        fs::write(
            root.join("b.json"),
            r#"{"protocol_id":"P2","title":"Flu","text":"fever","icd_codes":["J11.1"]}"#,
        )
        .unwrap();
        fs::write(root.join("a.json"), r#"{"text":"cough"}"#).unwrap();
        fs::write(root.join("notes.txt"), "not a protocol").unwrap();

        let records = load(&CorpusSource::directory(root)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "a.json");
        assert_eq!(records[0].title, None);
        assert!(records[0].codes.is_empty());
        assert_eq!(records[1].id, "P2");
        assert_eq!(records[1].title.as_deref(), Some("Flu"));
        assert_eq!(records[1].codes, vec!["J11.1".to_string()]);
    }

    #[test]
    fn directory_mode_fails_fast_on_bad_json() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("good.json"), r#"{"protocol_id":"P1","text":"ok"}"#).unwrap();
        fs::write(temp.path().join("bad.json"), "{ not json").unwrap();

        let err = load(&CorpusSource::directory(temp.path())).unwrap_err();
        assert!(matches!(err, RagError::CorpusParseError { line: None, .. }));
    }

    #[test]
    fn missing_sources_are_reported() {
        let temp = tempfile::tempdir().unwrap();
        let missing = temp.path().join("nope");
        assert!(matches!(
            load(&CorpusSource::directory(&missing)),
            Err(RagError::CorpusNotFound { .. })
        ));
        assert!(matches!(
            load(&CorpusSource::json_lines(missing.join("corpus.jsonl"))),
            Err(RagError::CorpusNotFound { .. })
        ));
    }

    #[test]
    fn json_lines_mode_applies_fallbacks() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("corpus.jsonl");
        fs::write(
            &path,
            concat!(
                r#"{"id": 7, "text": "головная боль", "gt": "G43.0"}"#,
                "\n\n",
                r#"{"text": "кашель", "icd_code": "J20"}"#,
                "\n",
                r#"{"body": "no text field"}"#,
                "\n",
            ),
        )
        .unwrap();

        let records = load(&CorpusSource::json_lines(&path)).unwrap();
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].id, "7");
        assert_eq!(records[0].ground_truth.as_deref(), Some("G43.0"));
        assert_eq!(records[0].codes, vec!["G43.0".to_string()]);

        // Blank line 1 still counts towards generated ids.
        assert_eq!(records[1].id, "protocol_2");
        assert_eq!(records[1].ground_truth.as_deref(), Some("J20"));

        assert_eq!(records[2].id, "protocol_3");
        assert_eq!(records[2].text, r#"{"body":"no text field"}"#);
        assert_eq!(records[2].ground_truth.as_deref(), Some("unknown"));
        assert!(records[2].codes.is_empty());
    }

    #[test]
    fn json_lines_mode_fails_fast_with_line_number() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("corpus.jsonl");
        fs::write(&path, "{\"id\":\"a\",\"text\":\"x\"}\n{broken\n").unwrap();

        let err = load(&CorpusSource::json_lines(&path)).unwrap_err();
        assert!(matches!(err, RagError::CorpusParseError { line: Some(2), .. }));
    }

    #[test]
    fn format_parses_from_cli_names() {
        assert_eq!("dir".parse::<CorpusFormat>().unwrap(), CorpusFormat::Directory);
        assert_eq!("jsonl".parse::<CorpusFormat>().unwrap(), CorpusFormat::JsonLines);
        assert!("csv".parse::<CorpusFormat>().is_err());
    }
}
