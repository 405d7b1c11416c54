use crate::error::Result;
use crate::extraction::{ExtractionOracle, PageImage};
use crate::inference::{SchemaGroups, SchemaOracle};
use crate::llm::client::GeminiClient;
use crate::llm::prompts::{extraction_prompt, schema_prompt, SYSTEM_PROMPT_EXTRACTION, SYSTEM_PROMPT_SCHEMA};
use crate::llm::types::{Blob, Part};
use crate::schema::StatementType;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::debug;
use schemars::JsonSchema;
use serde_json::Value;

/// Reads statement tables with Gemini's document understanding.
pub struct GeminiExtractionOracle {
    client: GeminiClient,
}

impl GeminiExtractionOracle {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }
}

impl ExtractionOracle for GeminiExtractionOracle {
    fn extract_statement(&self, pages: &[PageImage], statement: StatementType) -> Result<String> {
        debug!(
            "Sending {} page part(s) to {} for {}",
            pages.len(),
            self.client.model(),
            statement
        );

        let mut parts = vec![Part::Text {
            text: extraction_prompt(statement),
        }];
        parts.extend(pages.iter().map(|page| Part::InlineData {
            inline_data: Blob {
                mime_type: page.mime_type.clone(),
                data: STANDARD.encode(&page.bytes),
            },
        }));

        self.client
            .generate_content(SYSTEM_PROMPT_EXTRACTION, parts, None)
    }
}

/// Groups line item labels under canonical names. Replies follow the
/// [`SchemaGroups`] shape enforced through a response schema.
pub struct GeminiSchemaOracle {
    client: GeminiClient,
}

impl GeminiSchemaOracle {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }
}

impl SchemaOracle for GeminiSchemaOracle {
    fn propose_mapping(&self, labels: &[String]) -> Result<String> {
        debug!("Sending {} labels to {}", labels.len(), self.client.model());
        let parts = vec![Part::Text {
            text: schema_prompt(labels)?,
        }];
        self.client.generate_content(
            SYSTEM_PROMPT_SCHEMA,
            parts,
            Some(gemini_response_schema::<SchemaGroups>()?),
        )
    }
}

/// Generates a Gemini-compatible JSON schema (no $ref, $schema, or definitions)
pub fn gemini_response_schema<T: JsonSchema>() -> serde_json::Result<Value> {
    let root = schemars::schema_for!(T);
    let mut value = serde_json::to_value(root)?;
    let definitions = value
        .as_object_mut()
        .and_then(|obj| obj.remove("definitions"))
        .unwrap_or(Value::Null);
    inline_definitions(&mut value, &definitions);
    Ok(value)
}

fn inline_definitions(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            let referenced = map
                .get("$ref")
                .and_then(Value::as_str)
                .and_then(|r| r.strip_prefix("#/definitions/"))
                .and_then(|name| definitions.get(name))
                .cloned();
            if let Some(mut definition) = referenced {
                inline_definitions(&mut definition, definitions);
                *value = definition;
                return;
            }

            map.remove("$schema");
            map.remove("title");
            map.remove("definitions");
            for child in map.values_mut() {
                inline_definitions(child, definitions);
            }
        }
        Value::Array(items) => {
            for item in items {
                inline_definitions(item, definitions);
            }
        }
        _ => {}
    }
}
