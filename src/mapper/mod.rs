//! AI-backed column mapping.
//!
//! Sends a small snippet of the parsed table plus the target schema to the
//! completion service and validates the returned field -> column mapping.
//! A partially-responsive AI call is tolerated: schema keys the AI forgot
//! come back as unmapped with a warning rather than failing the run.

use serde_json::{Map, Value};

use crate::ai::{extract_json_object, Completion, CompletionOptions};
use crate::api::logs::{log_info, log_success, log_warning};
use crate::error::{AiError, AiResult};
use crate::models::{ColumnMapping, TargetSchema};
use crate::reader::ParsedTable;

/// Token budget for the mapping response; the object is small.
const MAPPING_MAX_TOKENS: u32 = 1024;

/// Render a snippet table as the delimited text embedded in the prompt.
/// Semicolons keep comma-laden values readable for the model.
pub fn render_snippet(snippet: &ParsedTable) -> String {
    snippet.to_delimited_text(';')
}

/// Infer a validated column mapping for `snippet` against `schema`.
///
/// Single-shot: a failed completion fails the mapping step outright.
pub async fn infer_mapping<C: Completion>(
    client: &C,
    schema: &TargetSchema,
    snippet: &ParsedTable,
) -> AiResult<ColumnMapping> {
    let snippet_text = render_snippet(snippet);
    let prompt = crate::ai::prompt::mapping_prompt(schema, &snippet_text);

    log_info(format!(
        "Asking {} for a column mapping ({} snippet rows, {} columns)",
        client.name(),
        snippet.rows.len(),
        snippet.headers.len()
    ));

    let response = client
        .complete(&prompt, &CompletionOptions::json(MAPPING_MAX_TOKENS))
        .await?;

    let object = parse_mapping_response(&response)?;
    let mapping = validate_mapping(schema, &object);

    log_success(format!(
        "Mapping received: {}/{} fields mapped",
        mapping.mapped_count(),
        schema.len()
    ));

    Ok(mapping)
}

/// Parse the response into a JSON object, trying each strategy in order:
/// the whole response first, then the fence-stripped/object-sliced form.
pub fn parse_mapping_response(response: &str) -> AiResult<Map<String, Value>> {
    let strategies: &[fn(&str) -> Option<Map<String, Value>>] =
        &[parse_whole_object, parse_extracted_object];

    for parse in strategies {
        if let Some(object) = parse(response) {
            return Ok(object);
        }
    }

    let preview: String = response.chars().take(200).collect();
    Err(AiError::MalformedResponse(format!(
        "mapping response is not a JSON object: {}",
        preview
    )))
}

fn parse_whole_object(response: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(response.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn parse_extracted_object(response: &str) -> Option<Map<String, Value>> {
    let candidate = extract_json_object(response);
    match serde_json::from_str::<Value>(&candidate) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Coerce the AI object into a complete mapping over the schema's keys.
///
/// Missing keys become unmapped with a warning; non-string values are
/// treated as unmapped. Column names the AI invented are kept here - the
/// normalizer ignores names absent from the actual table.
pub fn validate_mapping(schema: &TargetSchema, object: &Map<String, Value>) -> ColumnMapping {
    let mut mapping = ColumnMapping::new();

    for key in schema.keys() {
        match object.get(key) {
            Some(Value::String(column)) if !column.trim().is_empty() => {
                mapping.insert(key, Some(column.trim().to_string()));
            }
            Some(Value::Null) => {
                mapping.insert(key, None);
            }
            Some(other) => {
                log_warning(format!(
                    "Mapping for '{}' has unexpected type ({}), treating as unmapped",
                    key, other
                ));
                mapping.insert(key, None);
            }
            None => {
                log_warning(format!(
                    "AI mapping is missing key '{}', treating as unmapped",
                    key
                ));
                mapping.insert(key, None);
            }
        }
    }

    mapping
}
