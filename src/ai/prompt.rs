//! Prompt builders for the completion service.
//!
//! Two prompts exist: the column-mapping prompt (tabular snippet -> JSON
//! object of field -> source column) and the free-text extraction prompt
//! (unstructured text -> JSON array of lead objects).

use crate::models::TargetSchema;

/// Build the column-mapping prompt from a schema and a delimited-text
/// snippet of the uploaded file.
pub fn mapping_prompt(schema: &TargetSchema, snippet: &str) -> String {
    format!(
        r#"You are an expert data mapping assistant. Your task is to analyze the provided text snippet from a user's uploaded file and map its columns to the following Salesforce Lead fields.
The goal is to identify which column header or data pattern in the uploaded file best corresponds to each Salesforce field.

Target Salesforce Lead Schema (field_api_name: description):
{schema_json}

User's File Snippet (a delimited-text rendering of the first few rows, including headers if present):
```text
{snippet}
```

Please return ONLY a JSON object. This JSON object must have keys that are the exact Salesforce Lead field API names from the Target Schema above (e.g., "LastName", "Company").
The values must be the exact column names (headers) found in the snippet that you believe map to that Salesforce field.
If you cannot find a clear or confident mapping for a Salesforce field, or if the field is not present in the snippet, use the JSON value null for that key.
Do not invent column names that are not present in the user's file snippet.
Focus on matching the meaning and typical content of the fields based on their descriptions in the Target Schema.

Example of the desired JSON output format (keys must match the Target Schema):
{{
  "LastName": "Nome do Contato",
  "Email": "Endereco de Email",
  "Company": "Nome da Organizacao",
  "Phone": null
}}

Now, provide the JSON mapping for the given snippet and Target Schema. Ensure your entire response is a single valid JSON object and nothing else."#,
        schema_json = schema.to_pretty_json(),
        snippet = snippet,
    )
}

/// Build the free-text extraction prompt. `name_hint` carries a person
/// name recovered from the file's own name, when one was found.
pub fn extraction_prompt(schema: &TargetSchema, content: &str, name_hint: Option<&str>) -> String {
    let hint_line = match name_hint {
        Some(name) => format!(
            "\nIMPORTANT INFORMATION FROM THE FILE NAME: the lead's name appears to be '{}'.\n",
            name
        ),
        None => String::new(),
    };

    let field_list = schema
        .keys()
        .map(|k| format!("'{}'", k))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"You are an expert in processing unstructured data and converting it into structured records.

YOUR TASK: extract ALL structured lead data from an unformatted text file and convert it into Salesforce-compatible records, even when the information is disorganized, badly formatted, or follows no pattern at all.

Read the text file content below with full attention:
```
{content}
```
{hint_line}
MANDATORY INSTRUCTIONS:

1. LEAD IDENTIFICATION: analyze the text and identify ALL information that could represent contact/lead data.
   - If the text mentions several people, output one record per person.
   - If there is only one person, output a single record.
   - Even if the text looks incomplete, extract every fragment of information you can.

2. SALESFORCE FIELDS: the fields to fill are exactly:
{field_list}

3. FIELD DESCRIPTIONS:
{schema_json}

4. EXTRACTION RULES:
   - NAME: identify any text that remotely looks like a person's name. When you find a full name, split it into FirstName and LastName.
   - PHONE: capture every number that could be a phone, even with irregular or partial formatting.
   - EMAIL: capture any text containing @ or resembling an e-mail address.
   - COMPANY: capture any text that could suggest a company or organization name.
   - OTHER FIELDS: use the field descriptions to identify anything else.

5. HEURISTICS:
   - Words like "cliente", "pessoa", "contato" suggest that the following text is a name.
   - Titles like "Sr.", "Sra.", "Dr." indicate the next words are a name.
   - Words after "empresa", "org", "organizacao", "companhia", "trabalha em/na/no" may indicate Company.
   - Text like "cliente: Joao" or "cliente - Joao" means "Joao" is the name.
   - Text like "patrimonio - 5000000" may indicate AnnualRevenue.

6. RESPONSE FORMAT: return EXCLUSIVELY a valid JSON array of objects, one per lead, with exactly the Salesforce fields listed above. Example:

```json
[
  {{
    "LastName": "Silva",
    "FirstName": "Joao",
    "Company": "Empresa ABC",
    "Email": "joao.silva@example.com",
    "Phone": "999999999",
    "Title": "Gerente",
    "Street": "Rua Exemplo, 123",
    "City": "Sao Paulo",
    "State": "SP",
    "PostalCode": "01234-567",
    "Country": "Brasil",
    "LeadSource": "Text import",
    "AnnualRevenue": "",
    "OwnerId": ""
  }}
]
```

7. FINAL RULES:
   - Unidentified fields become the empty string ("").
   - When there is no last name, put the full name in LastName.
   - Every record must have at least LastName and Company.
   - Extract as much as possible, even from badly formatted text.

IMPORTANT: return ONLY the valid JSON array, with no additional text."#,
        content = content,
        hint_line = hint_line,
        field_list = field_list,
        schema_json = schema.to_pretty_json(),
    )
}
