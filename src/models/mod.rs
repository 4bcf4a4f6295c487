//! Domain models for the conversion and upload pipeline.
//!
//! - [`Lead`] - one fully-normalized record, ready for submission
//! - [`TargetSchema`] - the Salesforce Lead fields the pipeline populates,
//!   with AI-facing descriptions
//! - [`ColumnMapping`] - inferred correspondence from source columns to
//!   schema fields
//! - [`UploadResult`] / [`RecordOutcome`] - aggregated per-record outcomes
//!   of one run

use serde::{Deserialize, Serialize};

// =============================================================================
// Lead
// =============================================================================

/// A normalized lead record.
///
/// Fields mirror the target schema exactly; every value is a `String` and
/// absence is always the empty string, never a null. Field access by
/// Salesforce API name goes through [`Lead::get`] / [`Lead::set`] so the
/// mapping and CSV layers never carry an untyped map around.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    #[serde(rename = "LastName")]
    pub last_name: String,
    #[serde(rename = "FirstName")]
    pub first_name: String,
    #[serde(rename = "Company")]
    pub company: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "Phone")]
    pub phone: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Street")]
    pub street: String,
    #[serde(rename = "City")]
    pub city: String,
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "PostalCode")]
    pub postal_code: String,
    #[serde(rename = "Country")]
    pub country: String,
    #[serde(rename = "LeadSource")]
    pub lead_source: String,
    #[serde(rename = "AnnualRevenue")]
    pub annual_revenue: String,
    #[serde(rename = "OwnerId")]
    pub owner_id: String,
}

impl Lead {
    /// Salesforce API names of every field, in schema order.
    pub const FIELDS: &'static [&'static str] = &[
        "LastName",
        "FirstName",
        "Company",
        "Email",
        "Phone",
        "Title",
        "Street",
        "City",
        "State",
        "PostalCode",
        "Country",
        "LeadSource",
        "AnnualRevenue",
        "OwnerId",
    ];

    /// Read a field by its Salesforce API name.
    ///
    /// Unknown names return the empty string; the schema is closed so this
    /// only happens for stale mappings, which are ignored by design.
    pub fn get(&self, field: &str) -> &str {
        match field {
            "LastName" => &self.last_name,
            "FirstName" => &self.first_name,
            "Company" => &self.company,
            "Email" => &self.email,
            "Phone" => &self.phone,
            "Title" => &self.title,
            "Street" => &self.street,
            "City" => &self.city,
            "State" => &self.state,
            "PostalCode" => &self.postal_code,
            "Country" => &self.country,
            "LeadSource" => &self.lead_source,
            "AnnualRevenue" => &self.annual_revenue,
            "OwnerId" => &self.owner_id,
            _ => "",
        }
    }

    /// Write a field by its Salesforce API name. Unknown names are ignored.
    pub fn set(&mut self, field: &str, value: String) {
        match field {
            "LastName" => self.last_name = value,
            "FirstName" => self.first_name = value,
            "Company" => self.company = value,
            "Email" => self.email = value,
            "Phone" => self.phone = value,
            "Title" => self.title = value,
            "Street" => self.street = value,
            "City" => self.city = value,
            "State" => self.state = value,
            "PostalCode" => self.postal_code = value,
            "Country" => self.country = value,
            "LeadSource" => self.lead_source = value,
            "AnnualRevenue" => self.annual_revenue = value,
            "OwnerId" => self.owner_id = value,
            _ => {}
        }
    }

    /// True when every field is empty.
    pub fn is_empty(&self) -> bool {
        Self::FIELDS.iter().all(|f| self.get(f).is_empty())
    }
}

// =============================================================================
// Target Schema
// =============================================================================

/// The fixed set of Salesforce Lead fields the pipeline knows how to
/// populate, each with a description that helps the AI understand the
/// field's purpose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSchema {
    fields: Vec<(String, String)>,
}

impl TargetSchema {
    /// The deployed Lead schema.
    pub fn lead() -> Self {
        let fields = [
            ("LastName", "The lead's last name (required in Salesforce). Ex: Silva, Santos."),
            ("FirstName", "The lead's first name. Ex: Joao, Maria."),
            ("Company", "The company or organization the lead belongs to (required in Salesforce). Ex: Acme Corp, Hospital Local."),
            ("Email", "The lead's primary e-mail address. Ex: joao.silva@example.com."),
            ("Phone", "The lead's primary phone number. Ex: (11) 99999-8888."),
            ("Title", "The lead's job title at the company. Ex: Sales Manager, Developer."),
            ("Street", "The lead's street address (street, number, unit)."),
            ("City", "The lead's city."),
            ("State", "The lead's state or province (short code where common, ex: SP, RJ)."),
            ("PostalCode", "The lead's postal code (CEP)."),
            ("Country", "The lead's country."),
            ("LeadSource", "Where the lead came from. Ex: Web, Referral, Trade show."),
            ("AnnualRevenue", "Approximate asset volume or annual revenue. Ex: R$ 1,300,000.00."),
            ("OwnerId", "Id of the Salesforce user that will own the lead."),
        ];
        Self {
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Field names, in schema order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// `(name, description)` pairs, in schema order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == field)
    }

    /// Render as a pretty JSON object, preserving schema order.
    pub fn to_pretty_json(&self) -> String {
        let mut out = String::from("{\n");
        for (i, (key, desc)) in self.fields.iter().enumerate() {
            let comma = if i + 1 < self.fields.len() { "," } else { "" };
            out.push_str(&format!(
                "  {}: {}{}\n",
                serde_json::to_string(key).unwrap_or_default(),
                serde_json::to_string(desc).unwrap_or_default(),
                comma
            ));
        }
        out.push('}');
        out
    }
}

impl Default for TargetSchema {
    fn default() -> Self {
        Self::lead()
    }
}

// =============================================================================
// Column Mapping
// =============================================================================

/// The inferred correspondence from schema field names to source column
/// names. Every schema key is present after validation; unmapped fields
/// carry `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnMapping {
    entries: std::collections::BTreeMap<String, Option<String>>,
}

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the source column (or lack of one) for a schema field.
    pub fn insert(&mut self, field: impl Into<String>, source: Option<String>) {
        self.entries.insert(field.into(), source);
    }

    /// The source column mapped to `field`, if any.
    pub fn source_for(&self, field: &str) -> Option<&str> {
        self.entries.get(field).and_then(|v| v.as_deref())
    }

    pub fn contains_key(&self, field: &str) -> bool {
        self.entries.contains_key(field)
    }

    /// Number of fields with a usable source column.
    pub fn mapped_count(&self) -> usize {
        self.entries.values().filter(|v| v.is_some()).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }
}

// =============================================================================
// Upload Outcomes
// =============================================================================

/// Outcome of one record's submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOutcome {
    /// Whether Salesforce created the record.
    pub success: bool,
    /// Created record id, when successful.
    pub id: Option<String>,
    /// Lead name, for user-facing reporting.
    pub name: String,
    /// Lead e-mail, for user-facing reporting.
    pub email: String,
    /// Error messages, when failed.
    pub errors: Vec<String>,
}

impl RecordOutcome {
    /// Successful outcome for a lead.
    pub fn created(lead: &Lead, id: String) -> Self {
        Self {
            success: true,
            id: Some(id),
            name: lead.last_name.clone(),
            email: lead.email.clone(),
            errors: Vec::new(),
        }
    }

    /// Failed outcome for a lead.
    pub fn failed(lead: &Lead, error: impl Into<String>) -> Self {
        Self {
            success: false,
            id: None,
            name: lead.last_name.clone(),
            email: lead.email.clone(),
            errors: vec![error.into()],
        }
    }

    /// Failure placeholder for a record no outcome was recorded for.
    pub fn missing() -> Self {
        Self {
            success: false,
            id: None,
            name: "Lead not processed".to_string(),
            email: String::new(),
            errors: vec!["No outcome returned by Salesforce".to_string()],
        }
    }
}

/// Aggregated result of one upload run, across all batches.
///
/// Invariant: `outcomes.len() == total == succeeded + failed`, even when
/// whole batches fail before producing per-record results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    /// Records submitted.
    pub total: usize,
    /// Records Salesforce created.
    pub succeeded: usize,
    /// Records that failed.
    pub failed: usize,
    /// Per-record outcomes, one per submitted record.
    pub outcomes: Vec<RecordOutcome>,
}

impl UploadResult {
    /// Build a result from outcomes, padding with failure placeholders
    /// until every submitted record is accounted for.
    pub fn from_outcomes(total: usize, mut outcomes: Vec<RecordOutcome>) -> Self {
        while outcomes.len() < total {
            outcomes.push(RecordOutcome::missing());
        }
        let succeeded = outcomes.iter().filter(|o| o.success).count();
        let failed = outcomes.len() - succeeded;
        Self {
            total: outcomes.len(),
            succeeded,
            failed,
            outcomes,
        }
    }

    /// The run counts as successful when at least one record made it.
    /// Callers must inspect [`UploadResult::outcomes`] for partial failures.
    pub fn is_success(&self) -> bool {
        self.succeeded > 0
    }
}
