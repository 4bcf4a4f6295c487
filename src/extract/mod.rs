//! Free-text lead extraction.
//!
//! The variant input path: no table, just an unstructured text file. The
//! completion service is asked for a JSON array of lead objects, and the
//! response goes through an ordered chain of parser strategies - each
//! tried only when the previous one failed, the last one synthesizing a
//! record straight from the source text so the path never comes back
//! empty-handed.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::path::Path;

use crate::ai::{complete_with_attempts, Completion, CompletionOptions};
use crate::api::logs::{log_info, log_success, log_warning};
use crate::config::NormalizeConfig;
use crate::error::{ParseError, PipelineResult};
use crate::models::{Lead, TargetSchema};
use crate::normalize::{clean_phone, finalize, format_email};

/// Token budget for extraction; free text can yield many records.
const EXTRACTION_MAX_TOKENS: u32 = 4096;

/// Completion attempts before giving up on the AI and synthesizing.
const EXTRACTION_ATTEMPTS: u32 = 3;

/// Generic last name applied by older imports; treated as overwritable.
const IMPORTED_PLACEHOLDER: &str = "Lead Importado";

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\w.\-]+@[\w.\-]+\.\w+").expect("static regex"));
static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{8,11}\b").expect("static regex"));
static ARRAY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)(\[\s*\{.*\}\s*\])").expect("static regex"));
static CAPITALIZED_WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z][a-z]+\b").expect("static regex"));

/// Filename patterns that carry a person's name, tried in order.
static NAME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)cliente\s*[-:]\s*(.+?)\.txt$",
        r"(?i)cliente[_\s](.+?)\.txt$",
        r"(?i)lead[-_\s:]\s*(.+?)\.txt$",
        r"(?i)contato[-_\s:]\s*(.+?)\.txt$",
        r"(?i)paciente[-_\s:]\s*(.+?)\.txt$",
        r"(?i)(.+?)\.txt$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});

// =============================================================================
// Entry point
// =============================================================================

/// Extract zero or more leads from a free-form text file.
pub async fn extract_records<C: Completion>(
    client: &C,
    schema: &TargetSchema,
    path: &Path,
    config: &NormalizeConfig,
) -> PipelineResult<Vec<Lead>> {
    let content = read_text_lossy(path)?;
    if content.trim().is_empty() {
        return Err(ParseError::EmptyFile.into());
    }

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let name_hint = name_from_filename(file_name);
    if let Some(ref name) = name_hint {
        log_info(format!("Name recovered from file name: {}", name));
    }

    let prompt = crate::ai::prompt::extraction_prompt(schema, &content, name_hint.as_deref());
    let response = match complete_with_attempts(
        client,
        &prompt,
        &CompletionOptions::json(EXTRACTION_MAX_TOKENS),
        EXTRACTION_ATTEMPTS,
    )
    .await
    {
        Ok(text) => text,
        Err(e) => {
            // The synthesis stage still works without an AI response.
            log_warning(format!("Extraction completion failed: {}", e));
            String::new()
        }
    };

    let ctx = ParseContext {
        response: &response,
        source_text: &content,
        name_hint: name_hint.as_deref(),
    };

    let (stage, objects) = parse_extraction_response(&ctx);
    log_success(format!(
        "Extraction parsed via '{}' stage: {} record(s)",
        stage,
        objects.len()
    ));

    let mut leads: Vec<Lead> = objects.iter().map(|o| lead_from_object(o, schema)).collect();

    if let (Some(name), Some(first)) = (name_hint.as_deref(), leads.first_mut()) {
        apply_name_hint(first, name, config);
    }
    for lead in &mut leads {
        finalize(lead, config);
    }

    Ok(leads)
}

// =============================================================================
// Text reading
// =============================================================================

/// Read a text file through the encoding fallback chain; the final
/// byte-level decode substitutes invalid sequences rather than failing.
pub fn read_text_lossy(path: &Path) -> PipelineResult<String> {
    let bytes = std::fs::read(path).map_err(ParseError::Io)?;

    if let Ok(text) = std::str::from_utf8(&bytes) {
        return Ok(text.to_string());
    }
    // Single-byte decode accepts any input
    Ok(encoding_rs::ISO_8859_15.decode(&bytes).0.to_string())
}

/// Recover a person's name from the file's own name, matching common
/// `cliente -`, `lead -`, `contato -` prefixes before the bare stem.
pub fn name_from_filename(file_name: &str) -> Option<String> {
    for pattern in NAME_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(file_name) {
            let name = captures.get(1)?.as_str().trim();
            if !name.is_empty() {
                return Some(name.to_string());
            }
        }
    }
    None
}

// =============================================================================
// Response parsing strategies
// =============================================================================

struct ParseContext<'a> {
    response: &'a str,
    source_text: &'a str,
    /// Name recovered from the file name; when present, the synthesis
    /// stage leaves the name slots empty for the hint application pass.
    name_hint: Option<&'a str>,
}

type Stage = fn(&ParseContext) -> Option<Vec<Map<String, Value>>>;

/// The ordered strategy chain; each stage runs only when every stage
/// before it failed, and the last stage always produces one record.
static STAGES: &[(&str, Stage)] = &[
    ("whole-array", parse_whole_array),
    ("regex-array", parse_regex_array),
    ("code-fence", parse_code_fence),
    ("field-rebuild", rebuild_from_fields),
    ("source-synthesis", synthesize_from_source),
];

fn parse_extraction_response(ctx: &ParseContext) -> (&'static str, Vec<Map<String, Value>>) {
    for &(name, stage) in STAGES {
        if let Some(objects) = stage(ctx) {
            if !objects.is_empty() {
                return (name, objects);
            }
        }
    }
    // Unreachable: synthesize_from_source always returns one record.
    ("source-synthesis", vec![Map::new()])
}

fn objects_from_value(value: Value) -> Option<Vec<Map<String, Value>>> {
    match value {
        Value::Array(items) => {
            let objects: Vec<Map<String, Value>> = items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect();
            if objects.is_empty() {
                None
            } else {
                Some(objects)
            }
        }
        Value::Object(map) => Some(vec![map]),
        _ => None,
    }
}

/// Stage 1: the whole response is a JSON array.
fn parse_whole_array(ctx: &ParseContext) -> Option<Vec<Map<String, Value>>> {
    let value: Value = serde_json::from_str(ctx.response.trim()).ok()?;
    match value {
        Value::Array(_) => objects_from_value(value),
        _ => None,
    }
}

/// Stage 2: a JSON array isolated by regex from surrounding prose.
fn parse_regex_array(ctx: &ParseContext) -> Option<Vec<Map<String, Value>>> {
    let captured = ARRAY_RE.captures(ctx.response)?.get(1)?.as_str();
    let value: Value = serde_json::from_str(captured).ok()?;
    objects_from_value(value)
}

/// Stage 3: content fenced by code-block markers.
fn parse_code_fence(ctx: &ParseContext) -> Option<Vec<Map<String, Value>>> {
    static FENCE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
        [
            r"(?s)```json\s*(.*?)\s*```",
            r"(?s)```\s*(.*?)\s*```",
            r"(?s)`\s*(.*?)\s*`",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static regex"))
        .collect()
    });

    for pattern in FENCE_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(ctx.response) {
            if let Some(inner) = captures.get(1) {
                if let Ok(value) = serde_json::from_str::<Value>(inner.as_str().trim()) {
                    if let Some(objects) = objects_from_value(value) {
                        return Some(objects);
                    }
                }
            }
        }
    }
    None
}

/// Stage 4: the response mentions the fields but is not valid JSON;
/// rebuild one record from quoted field values.
fn rebuild_from_fields(ctx: &ParseContext) -> Option<Vec<Map<String, Value>>> {
    if !(ctx.response.contains("LastName") && ctx.response.contains("Email")) {
        return None;
    }

    let first_name = capture_field(ctx.response, "FirstName");
    let last_name = capture_field(ctx.response, "LastName");
    let email = capture_field(ctx.response, "Email");
    let phone = capture_field(ctx.response, "Phone");

    if last_name.is_none() && email.is_none() {
        return None;
    }

    let mut map = Map::new();
    map.insert("FirstName".into(), Value::String(first_name.unwrap_or_default()));
    map.insert("LastName".into(), Value::String(last_name.unwrap_or_default()));
    map.insert("Email".into(), Value::String(email.unwrap_or_default()));
    map.insert("Phone".into(), Value::String(phone.unwrap_or_default()));
    Some(vec![map])
}

fn capture_field(text: &str, field: &str) -> Option<String> {
    let pattern = format!(r#""{}"\s*:\s*"([^"]+)""#, field);
    Regex::new(&pattern)
        .ok()?
        .captures(text)?
        .get(1)
        .map(|m| m.as_str().to_string())
}

/// Stage 5: last resort - one generic record from e-mail/phone patterns
/// in the source text itself.
fn synthesize_from_source(ctx: &ParseContext) -> Option<Vec<Map<String, Value>>> {
    let email = EMAIL_RE
        .find(ctx.source_text)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    let phone = PHONE_RE
        .find(ctx.source_text)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    let name = if ctx.name_hint.is_some() {
        // The filename name wins over anything guessed from the content
        String::new()
    } else {
        let first_line = ctx
            .source_text
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or_default();
        if !first_line.is_empty() && first_line.len() <= 80 {
            first_line.to_string()
        } else {
            CAPITALIZED_WORD_RE
                .find(ctx.source_text)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default()
        }
    };

    let mut map = Map::new();
    map.insert("LastName".into(), Value::String(name));
    map.insert("Email".into(), Value::String(email));
    map.insert("Phone".into(), Value::String(phone));
    Some(vec![map])
}

// =============================================================================
// Record assembly
// =============================================================================

/// Build a lead from a raw extracted object, guaranteeing every schema key
/// is present (empty when unknown).
fn lead_from_object(object: &Map<String, Value>, schema: &TargetSchema) -> Lead {
    let mut lead = Lead::default();
    for field in schema.keys() {
        let raw = object.get(field).map(value_to_string).unwrap_or_default();
        let value = match field {
            "Email" => format_email(&raw),
            "Phone" => clean_phone(&raw),
            _ => raw.trim().to_string(),
        };
        lead.set(field, value);
    }
    lead
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Overwrite empty or placeholder name fields with the filename-derived
/// name, splitting a multi-token name into first/last.
fn apply_name_hint(lead: &mut Lead, hint: &str, config: &NormalizeConfig) {
    let first_empty = lead.first_name.trim().is_empty();
    let last = lead.last_name.trim();
    let last_replaceable = last.is_empty()
        || last == config.fallback_last_name
        || last == IMPORTED_PLACEHOLDER;

    if !(first_empty && last_replaceable) {
        return;
    }

    let parts: Vec<&str> = hint.split_whitespace().collect();
    match parts.as_slice() {
        [] => {}
        [only] => lead.last_name = (*only).to_string(),
        [first, rest @ ..] => {
            lead.first_name = (*first).to_string();
            lead.last_name = rest.join(" ");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AiError, AiResult};
    use std::io::Write;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CannedCompletion {
        response: String,
    }

    impl Completion for CannedCompletion {
        async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> AiResult<String> {
            Ok(self.response.clone())
        }
    }

    struct CountingFailure {
        calls: AtomicU32,
    }

    impl Completion for CountingFailure {
        async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> AiResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(AiError::RequestFailed("down".into()))
        }
    }

    fn write_txt(name: &str, content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_name_from_filename_patterns() {
        assert_eq!(
            name_from_filename("cliente - joao lucas santos.txt").as_deref(),
            Some("joao lucas santos")
        );
        assert_eq!(
            name_from_filename("cliente_maria silva.txt").as_deref(),
            Some("maria silva")
        );
        assert_eq!(name_from_filename("lead: pedro.txt").as_deref(), Some("pedro"));
        // Bare stem still counts, per the catch-all pattern
        assert_eq!(name_from_filename("anotacoes.txt").as_deref(), Some("anotacoes"));
        assert_eq!(name_from_filename("archive.zip"), None);
    }

    #[test]
    fn test_stage_whole_array() {
        let ctx = ParseContext {
            response: r#"[{"LastName": "Silva", "Email": "a@b.com"}]"#,
            source_text: "",
            name_hint: None,
        };
        let (stage, objects) = parse_extraction_response(&ctx);
        assert_eq!(stage, "whole-array");
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0]["LastName"], "Silva");
    }

    #[test]
    fn test_stage_regex_array() {
        let ctx = ParseContext {
            response: "Sure, here are the leads: [{\"LastName\": \"Silva\"}] hope it helps!",
            source_text: "",
            name_hint: None,
        };
        let (stage, objects) = parse_extraction_response(&ctx);
        assert_eq!(stage, "regex-array");
        assert_eq!(objects.len(), 1);
    }

    #[test]
    fn test_stage_code_fence() {
        let ctx = ParseContext {
            response: "```json\n{\"LastName\": \"Silva\", \"Company\": \"Acme\"}\n```",
            source_text: "",
            name_hint: None,
        };
        let (stage, objects) = parse_extraction_response(&ctx);
        assert_eq!(stage, "code-fence");
        assert_eq!(objects[0]["Company"], "Acme");
    }

    #[test]
    fn test_stage_field_rebuild() {
        let ctx = ParseContext {
            response: r#"The record would be "FirstName": "Joao", "LastName": "Silva", "Email": "joao@b.com", but I could not format it"#,
            source_text: "",
            name_hint: None,
        };
        let (stage, objects) = parse_extraction_response(&ctx);
        assert_eq!(stage, "field-rebuild");
        assert_eq!(objects[0]["FirstName"], "Joao");
        assert_eq!(objects[0]["Email"], "joao@b.com");
    }

    #[test]
    fn test_stage_source_synthesis() {
        let ctx = ParseContext {
            response: "no structure here at all",
            source_text: "Anotacoes da reuniao\ncontato: fulano@empresa.com tel 11987654321",
            name_hint: None,
        };
        let (stage, objects) = parse_extraction_response(&ctx);
        assert_eq!(stage, "source-synthesis");
        assert_eq!(objects[0]["Email"], "fulano@empresa.com");
        assert_eq!(objects[0]["Phone"], "11987654321");
    }

    #[tokio::test]
    async fn test_extract_records_happy_path() {
        let client = CannedCompletion {
            response: r#"[
                {"LastName": "Silva", "FirstName": "Joao", "Company": "Acme", "Email": "JOAO@ACME.COM", "Phone": "(11) 98888-7777"},
                {"LastName": "Santos", "FirstName": "", "Company": "", "Email": "", "Phone": ""}
            ]"#
            .into(),
        };
        let (_dir, path) = write_txt("reuniao.txt", "Joao Silva da Acme, joao@acme.com");

        let leads = extract_records(
            &client,
            &TargetSchema::lead(),
            &path,
            &NormalizeConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(leads.len(), 2);
        assert_eq!(leads[0].email, "joao@acme.com");
        assert_eq!(leads[0].phone, "11988887777");
        // Mandatory defaulting applied to the sparse second record
        assert_eq!(leads[1].company, "Empresa Desconhecida");
        assert_eq!(leads[1].last_name, "Santos");
        // Every schema key present
        assert_eq!(leads[0].owner_id, "");
    }

    #[tokio::test]
    async fn test_extract_records_survives_dead_ai() {
        let client = CountingFailure {
            calls: AtomicU32::new(0),
        };
        let (_dir, path) = write_txt(
            "cliente - joao lucas.txt",
            "patrimonio 500000\nemail joao@exemplo.com\n11912345678",
        );

        let leads = extract_records(
            &client,
            &TargetSchema::lead(),
            &path,
            &NormalizeConfig::default(),
        )
        .await
        .unwrap();

        // Bounded retry, then synthesis from the source text
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].email, "joao@exemplo.com");
        // Filename name overrides the synthesized one
        assert_eq!(leads[0].first_name, "joao");
        assert_eq!(leads[0].last_name, "lucas");
        assert_eq!(leads[0].company, "Empresa Desconhecida");
    }

    #[tokio::test]
    async fn test_name_hint_respects_real_names() {
        let client = CannedCompletion {
            response: r#"[{"LastName": "Oliveira", "FirstName": "Maria", "Company": "XPTO"}]"#.into(),
        };
        let (_dir, path) = write_txt("cliente - joao lucas.txt", "Maria Oliveira, XPTO");

        let leads = extract_records(
            &client,
            &TargetSchema::lead(),
            &path,
            &NormalizeConfig::default(),
        )
        .await
        .unwrap();

        // AI found a real name; the filename hint must not clobber it
        assert_eq!(leads[0].first_name, "Maria");
        assert_eq!(leads[0].last_name, "Oliveira");
    }

    #[tokio::test]
    async fn test_empty_file_rejected() {
        let client = CannedCompletion {
            response: "[]".into(),
        };
        let (_dir, path) = write_txt("vazio.txt", "   \n  ");

        let err = extract_records(
            &client,
            &TargetSchema::lead(),
            &path,
            &NormalizeConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_read_text_lossy_latin1() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latin.txt");
        std::fs::write(&path, b"Jos\xe9 \xe7a va").unwrap();

        let text = read_text_lossy(&path).unwrap();
        assert!(text.contains("Jos"));
        assert!(!text.is_empty());
    }
}
