//! Record normalization.
//!
//! Applies a validated column mapping to a parsed table and cleans every
//! value into Salesforce-ready shape. All transforms are pure functions of
//! one value and idempotent, so records can safely pass through the
//! normalizer more than once.

use crate::config::NormalizeConfig;
use crate::models::{ColumnMapping, Lead, TargetSchema};
use crate::reader::ParsedTable;

// =============================================================================
// Per-value transforms
// =============================================================================

/// Title-case a person or company name.
///
/// Splits on whitespace and title-cases each token; hyphenated tokens get
/// each sub-token title-cased independently ("jose carlos silva-neto" ->
/// "Jose Carlos Silva-Neto").
pub fn format_name(name: &str) -> String {
    name.split_whitespace()
        .map(|part| {
            if part.contains('-') {
                part.split('-')
                    .map(capitalize)
                    .collect::<Vec<_>>()
                    .join("-")
            } else {
                capitalize(part)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

/// Lower-case and trim an e-mail address.
pub fn format_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Strip a phone number down to its digits.
///
/// The trailing `.0` artifact left by numeric-typed spreadsheet cells is
/// removed before digit-stripping; `NA` and empty inputs yield the empty
/// string.
pub fn clean_phone(phone: &str) -> String {
    let trimmed = phone.trim();
    if trimmed.is_empty() || trimmed == "NA" {
        return String::new();
    }

    let without_artifact = trimmed.strip_suffix(".0").unwrap_or(trimmed);
    without_artifact
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect()
}

/// Parse a monetary value into an integer.
///
/// Currency-marked values ("R$ 1,300,000.00") get the marker, thousands
/// separators, spaces and a trailing `.00` stripped before parsing. Any
/// parse failure, and absent input, yields `default` - a business
/// placeholder, not a zero.
pub fn money_to_integer(value: &str, default: i64) -> i64 {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return default;
    }

    if trimmed.contains("R$") {
        let cleaned = trimmed.replace("R$", "").replace([',', ' '], "");
        let cleaned = cleaned.strip_suffix(".00").unwrap_or(&cleaned);
        cleaned.parse().unwrap_or(default)
    } else {
        trimmed.parse().unwrap_or(default)
    }
}

// =============================================================================
// Record-level steps
// =============================================================================

/// Move the first token of a multi-word `LastName` into an empty
/// `FirstName`.
///
/// Best-effort: names with several legitimate last-name tokens cannot be
/// told apart from combined full names, so this runs only when explicitly
/// enabled.
pub fn split_combined_name(lead: &mut Lead) {
    if !lead.first_name.trim().is_empty() {
        return;
    }

    let last = lead.last_name.trim().to_string();
    let mut parts = last.splitn(2, char::is_whitespace);
    if let (Some(first), Some(rest)) = (parts.next(), parts.next()) {
        let rest = rest.trim();
        if !rest.is_empty() {
            lead.first_name = first.to_string();
            lead.last_name = rest.to_string();
        }
    }
}

/// Force the mandatory fields to the configured fallbacks when empty.
/// Unconditional: runs whether or not the field was ever mapped.
pub fn apply_mandatory_defaults(lead: &mut Lead, config: &NormalizeConfig) {
    if lead.last_name.trim().is_empty() {
        lead.last_name = config.fallback_last_name.clone();
    }
    if lead.company.trim().is_empty() {
        lead.company = config.fallback_company.clone();
    }
}

/// Final per-record pass: optional name splitting, then mandatory
/// defaulting. Splitting runs first so a fallback last name is never
/// broken apart.
pub fn finalize(lead: &mut Lead, config: &NormalizeConfig) {
    if config.split_combined_names {
        split_combined_name(lead);
    }
    apply_mandatory_defaults(lead, config);
}

/// Which transform a schema field gets. The monetary transform only runs
/// for values coming out of a mapped column; unmapped fields stay empty.
fn transform_field(field: &str, raw: &str, config: &NormalizeConfig) -> String {
    match field {
        "FirstName" | "LastName" => format_name(raw),
        "Email" => format_email(raw),
        "Phone" => clean_phone(raw),
        "AnnualRevenue" => money_to_integer(raw, config.default_asset_value).to_string(),
        _ => raw.trim().to_string(),
    }
}

/// Apply the mapping to the full table, producing one [`Lead`] per row.
///
/// A field whose mapping names a column missing from the table is treated
/// as unmapped (the AI is not allowed to invent columns, but stale names
/// must not break the run).
pub fn normalize_records(
    table: &ParsedTable,
    mapping: &ColumnMapping,
    schema: &TargetSchema,
    config: &NormalizeConfig,
) -> Vec<Lead> {
    table
        .rows
        .iter()
        .map(|row| {
            let mut lead = Lead::default();
            for field in schema.keys() {
                let source = mapping
                    .source_for(field)
                    .filter(|column| table.has_column(column));

                let value = match source {
                    Some(column) => {
                        let raw = row.get(column).map(String::as_str).unwrap_or("");
                        transform_field(field, raw, config)
                    }
                    None => String::new(),
                };
                lead.set(field, value);
            }
            finalize(&mut lead, config);
            lead
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::ParsedTable;
    use std::collections::HashMap;

    fn table(headers: &[&str], rows: &[&[&str]]) -> ParsedTable {
        ParsedTable {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| {
                    headers
                        .iter()
                        .zip(row.iter())
                        .map(|(h, v)| (h.to_string(), v.to_string()))
                        .collect::<HashMap<_, _>>()
                })
                .collect(),
            encoding: "utf-8".to_string(),
            delimiter: Some(','),
        }
    }

    #[test]
    fn test_format_name_title_cases_tokens() {
        assert_eq!(format_name("jose carlos silva-neto"), "Jose Carlos Silva-Neto");
        assert_eq!(format_name("  MARIA   SANTOS  "), "Maria Santos");
        assert_eq!(format_name(""), "");
    }

    #[test]
    fn test_format_name_is_idempotent() {
        let once = format_name("JOSE SILVA");
        let twice = format_name(&once);
        assert_eq!(once, "Jose Silva");
        assert_eq!(once, twice);
    }

    #[test]
    fn test_format_email() {
        assert_eq!(format_email("  Joao.Silva@Example.COM "), "joao.silva@example.com");
    }

    #[test]
    fn test_clean_phone() {
        assert_eq!(clean_phone("(11) 99999-8888.0"), "11999998888");
        assert_eq!(clean_phone("NA"), "");
        assert_eq!(clean_phone(""), "");
        assert_eq!(clean_phone("+55 11 91234-5678"), "5511912345678");
    }

    #[test]
    fn test_money_to_integer() {
        assert_eq!(money_to_integer("R$ 1,300,000.00", 1_300_000), 1_300_000);
        assert_eq!(money_to_integer("R$ 500,000", 1_300_000), 500_000);
        assert_eq!(money_to_integer("not a number", 1_300_000), 1_300_000);
        assert_eq!(money_to_integer("", 1_300_000), 1_300_000);
        assert_eq!(money_to_integer("750000", 1_300_000), 750_000);
    }

    #[test]
    fn test_unmapped_fields_are_empty_strings() {
        let table = table(&["Nome", "Empresa"], &[&["alice", "acme"]]);
        let mut mapping = ColumnMapping::new();
        mapping.insert("LastName", Some("Nome".into()));
        mapping.insert("Company", Some("Empresa".into()));
        mapping.insert("Phone", None);

        let leads = normalize_records(
            &table,
            &mapping,
            &TargetSchema::lead(),
            &NormalizeConfig::default(),
        );

        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].phone, "");
        assert_eq!(leads[0].email, "");
        assert_eq!(leads[0].last_name, "Alice");
    }

    #[test]
    fn test_stale_mapped_column_is_ignored() {
        let table = table(&["Nome"], &[&["alice"]]);
        let mut mapping = ColumnMapping::new();
        mapping.insert("LastName", Some("Nome".into()));
        // AI hallucinated a column that does not exist
        mapping.insert("Email", Some("Endereco de Email".into()));

        let leads = normalize_records(
            &table,
            &mapping,
            &TargetSchema::lead(),
            &NormalizeConfig::default(),
        );
        assert_eq!(leads[0].email, "");
    }

    #[test]
    fn test_mandatory_fields_always_non_empty() {
        let table = table(&["Email"], &[&["a@b.com"], &[""]]);
        let mut mapping = ColumnMapping::new();
        mapping.insert("Email", Some("Email".into()));

        let config = NormalizeConfig::default();
        let leads = normalize_records(&table, &mapping, &TargetSchema::lead(), &config);

        for lead in &leads {
            assert!(!lead.last_name.is_empty());
            assert!(!lead.company.is_empty());
        }
        assert_eq!(leads[0].last_name, "Lead Sem Nome");
        assert_eq!(leads[0].company, "Empresa Desconhecida");
    }

    #[test]
    fn test_mapped_scenario_keeps_combined_name() {
        // "Full Name,Organization,Contact Email" with the AI mapping
        // {"LastName":"Full Name","Company":"Organization","Email":"Contact Email"}
        let table = table(
            &["Full Name", "Organization", "Contact Email"],
            &[&["John Doe", "Example Corp", "j.doe@example.com"]],
        );
        let mut mapping = ColumnMapping::new();
        mapping.insert("LastName", Some("Full Name".into()));
        mapping.insert("Company", Some("Organization".into()));
        mapping.insert("Email", Some("Contact Email".into()));

        let leads = normalize_records(
            &table,
            &mapping,
            &TargetSchema::lead(),
            &NormalizeConfig::default(),
        );

        assert_eq!(leads.len(), 1);
        // Splitting is off by default: both tokens stay in LastName
        assert_eq!(leads[0].last_name, "John Doe");
        assert_eq!(leads[0].first_name, "");
        assert_eq!(leads[0].company, "Example Corp");
        assert_eq!(leads[0].email, "j.doe@example.com");
        assert_eq!(leads[0].city, "");
    }

    #[test]
    fn test_split_combined_name_when_enabled() {
        let table = table(&["Nome", "Org"], &[&["joao lucas santos", "acme"]]);
        let mut mapping = ColumnMapping::new();
        mapping.insert("LastName", Some("Nome".into()));
        mapping.insert("Company", Some("Org".into()));

        let config = NormalizeConfig {
            split_combined_names: true,
            ..NormalizeConfig::default()
        };
        let leads = normalize_records(&table, &mapping, &TargetSchema::lead(), &config);

        assert_eq!(leads[0].first_name, "Joao");
        assert_eq!(leads[0].last_name, "Lucas Santos");
    }

    #[test]
    fn test_split_does_not_break_fallback_name() {
        let mut lead = Lead::default();
        let config = NormalizeConfig {
            split_combined_names: true,
            ..NormalizeConfig::default()
        };
        finalize(&mut lead, &config);

        // The multi-word fallback stays whole in LastName
        assert_eq!(lead.last_name, "Lead Sem Nome");
        assert_eq!(lead.first_name, "");
    }

    #[test]
    fn test_split_leaves_existing_first_name_alone() {
        let mut lead = Lead {
            first_name: "Maria".into(),
            last_name: "dos Santos".into(),
            ..Lead::default()
        };
        split_combined_name(&mut lead);
        assert_eq!(lead.first_name, "Maria");
        assert_eq!(lead.last_name, "dos Santos");
    }

    #[test]
    fn test_annual_revenue_transform_only_when_mapped() {
        let table = table(&["Nome", "Patrimonio"], &[&["alice", "R$ 2,000,000.00"]]);
        let mut mapping = ColumnMapping::new();
        mapping.insert("LastName", Some("Nome".into()));
        mapping.insert("AnnualRevenue", Some("Patrimonio".into()));

        let config = NormalizeConfig::default();
        let leads = normalize_records(&table, &mapping, &TargetSchema::lead(), &config);
        assert_eq!(leads[0].annual_revenue, "2000000");

        // Unmapped: stays empty, no placeholder leaks in
        let mut unmapped = ColumnMapping::new();
        unmapped.insert("LastName", Some("Nome".into()));
        let leads = normalize_records(&table, &unmapped, &TargetSchema::lead(), &config);
        assert_eq!(leads[0].annual_revenue, "");
    }

    #[test]
    fn test_mapped_but_empty_money_cell_gets_default() {
        let table = table(&["Nome", "Patrimonio"], &[&["alice", ""]]);
        let mut mapping = ColumnMapping::new();
        mapping.insert("LastName", Some("Nome".into()));
        mapping.insert("AnnualRevenue", Some("Patrimonio".into()));

        let leads = normalize_records(
            &table,
            &mapping,
            &TargetSchema::lead(),
            &NormalizeConfig::default(),
        );
        assert_eq!(leads[0].annual_revenue, "1300000");
    }
}
