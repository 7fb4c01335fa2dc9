//! The mapping oracle: an external chat-completion model that performs the
//! two judgment calls the pipeline cannot make deterministically, turning
//! attachment context into field data and mapping field data onto template
//! cells.
//!
//! Everything around the model call is deterministic: prompts are built
//! verbatim from the structure and data JSON, and responses go through a
//! defensive recovery ladder before parsing.

mod client;
mod parse;
mod prompt;

pub use client::{ChatCompletion, ChatRequest, InlineImage, OpenRouterClient};
pub use parse::recover_json;

#[cfg(test)]
pub use client::MockOracle;

use thiserror::Error;

use crate::types::{ContextPayload, FillMap, LiteralData, TemplateStructure};

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request timed out")]
    Timeout,
    #[error("cannot reach oracle endpoint: {0}")]
    Connection(String),
    #[error("oracle transport error: {0}")]
    Transport(String),
    #[error("oracle returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("oracle response missing message content")]
    MalformedResponse,
    #[error("oracle response is not recoverable JSON")]
    Unparseable,
    #[error("cannot read image for oracle request: {0}")]
    ImageRead(String),
}

/// High-level oracle operations over any [`ChatCompletion`] transport.
pub struct MappingOracle<C> {
    client: C,
}

impl<C: ChatCompletion> MappingOracle<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Map resolved field data onto template cells.
    ///
    /// A transport or API failure is an error. A response that is not
    /// recoverable JSON degrades to an empty fill map so the job can still
    /// produce an untouched copy of the template.
    pub fn map_fields(
        &self,
        structure: &TemplateStructure,
        data: &LiteralData,
    ) -> Result<FillMap, OracleError> {
        let request = ChatRequest {
            system: None,
            user_text: prompt::fill_mapping(structure, data),
            images: Vec::new(),
        };
        let response = self.client.complete(&request)?;
        tracing::debug!(chars = response.len(), "mapping response received");

        let Some(value) = parse::recover_json(&response) else {
            tracing::warn!("mapping response is not recoverable JSON, using empty fill map");
            return Ok(FillMap::new());
        };
        let Some(object) = value.as_object() else {
            tracing::warn!("mapping response is not a JSON object, using empty fill map");
            return Ok(FillMap::new());
        };

        let fill_map = FillMap::from_object(object.clone());
        tracing::info!(fields = fill_map.len(), "field mapping complete");
        Ok(fill_map)
    }

    /// Distill attachment context into flat field data.
    ///
    /// Unlike mapping, an unparseable response here is fatal: with no field
    /// data the rest of the pipeline has nothing to work with.
    pub fn extract_fields(&self, payload: &ContextPayload) -> Result<LiteralData, OracleError> {
        let mut images = Vec::with_capacity(payload.images.len());
        for image in &payload.images {
            match InlineImage::from_file(&image.path, &image.mime) {
                Ok(inline) => images.push(inline),
                Err(e) => {
                    tracing::warn!(origin = %image.origin, error = %e, "skipping unreadable image");
                }
            }
        }
        let request = ChatRequest {
            system: Some(prompt::EXTRACTION_SYSTEM.to_string()),
            user_text: prompt::extraction(&payload.text),
            images,
        };
        let response = self.client.complete(&request)?;
        tracing::debug!(chars = response.len(), "extraction response received");

        let value = parse::recover_json(&response).ok_or(OracleError::Unparseable)?;
        let object = value.as_object().ok_or(OracleError::Unparseable)?;
        tracing::info!(fields = object.len(), "field extraction complete");
        Ok(object.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CellId;

    fn structure() -> TemplateStructure {
        let mut s = TemplateStructure::new();
        s.insert(CellId::new(0, 0, 0), "Name".into());
        s.insert(CellId::new(0, 0, 1), String::new());
        s
    }

    fn data() -> LiteralData {
        serde_json::json!({"name": "Alice"}).as_object().unwrap().clone()
    }

    #[test]
    fn map_fields_parses_clean_json() {
        let oracle = MappingOracle::new(MockOracle::returning(
            r#"{"table_0_row_0_col_1": "Alice"}"#,
        ));
        let fill_map = oracle.map_fields(&structure(), &data()).unwrap();
        assert_eq!(fill_map.get("table_0_row_0_col_1"), Some("Alice"));
    }

    #[test]
    fn map_fields_recovers_fenced_json() {
        let oracle = MappingOracle::new(MockOracle::returning(
            "Here is the mapping:\n```json\n{\"table_0_row_0_col_1\": \"Alice\"}\n```\nDone.",
        ));
        let fill_map = oracle.map_fields(&structure(), &data()).unwrap();
        assert_eq!(fill_map.get("table_0_row_0_col_1"), Some("Alice"));
    }

    #[test]
    fn map_fields_degrades_to_empty_on_garbage() {
        let oracle = MappingOracle::new(MockOracle::returning("I cannot produce JSON today."));
        let fill_map = oracle.map_fields(&structure(), &data()).unwrap();
        assert!(fill_map.is_empty());
        assert!(fill_map.attachments().is_empty());
    }

    #[test]
    fn map_fields_propagates_transport_errors() {
        let oracle = MappingOracle::new(MockOracle::failing(OracleError::Timeout));
        let err = oracle.map_fields(&structure(), &data()).unwrap_err();
        assert!(matches!(err, OracleError::Timeout));
    }

    #[test]
    fn extract_fields_is_strict_about_json() {
        let oracle = MappingOracle::new(MockOracle::returning("no data here"));
        let payload = {
            let mut p = ContextPayload::default();
            p.push_text("notes.txt", "some notes");
            p
        };
        let err = oracle.extract_fields(&payload).unwrap_err();
        assert!(matches!(err, OracleError::Unparseable));
    }

    #[test]
    fn extract_fields_skips_unreadable_images() {
        let mock = MockOracle::returning("{\"tenant\": \"Alice\"}");
        let oracle = MappingOracle::new(&mock);
        let payload = {
            let mut p = ContextPayload::default();
            p.push_text("notes.txt", "Tenant Alice");
            p.images.push(crate::types::ImageRef {
                path: std::path::PathBuf::from("/definitely/not/here.png"),
                mime: "image/png".into(),
                origin: "here.png".into(),
            });
            p
        };
        let data = oracle.extract_fields(&payload).unwrap();
        assert_eq!(data.get("tenant").and_then(|v| v.as_str()), Some("Alice"));
        let requests = mock.requests.lock().unwrap();
        assert!(requests[0].images.is_empty());
    }

    #[test]
    fn extract_fields_returns_flat_object() {
        let oracle = MappingOracle::new(MockOracle::returning(
            "```json\n{\"tenant\": \"Alice\", \"unit\": \"4B\"}\n```",
        ));
        let payload = {
            let mut p = ContextPayload::default();
            p.push_text("notes.txt", "Tenant Alice lives in unit 4B");
            p
        };
        let data = oracle.extract_fields(&payload).unwrap();
        assert_eq!(data.get("tenant").and_then(|v| v.as_str()), Some("Alice"));
        assert_eq!(data.get("unit").and_then(|v| v.as_str()), Some("4B"));
    }
}
