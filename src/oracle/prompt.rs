//! Prompt construction for the two oracle calls.
//!
//! Prompts are deterministic functions of their inputs. Both demand a bare
//! JSON object back, and both are written defensively because models add
//! prose and fences anyway.

use crate::types::{LiteralData, TemplateStructure};

pub const EXTRACTION_SYSTEM: &str = "You are a meticulous data extraction assistant. \
You read documents and images and produce structured field data. \
You answer with a single JSON object and nothing else.";

/// Prompt for mapping resolved field data onto template cells.
pub fn fill_mapping(structure: &TemplateStructure, data: &LiteralData) -> String {
    let structure_json =
        serde_json::to_string_pretty(structure).unwrap_or_else(|_| "{}".to_string());
    let data_json = serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string());

    format!(
        r#"You are an expert assistant for filling out Word documents. Your task is to map data from a JSON object to a structured Word document template.

The template's structure is provided as a JSON object where keys are unique identifiers for each cell (e.g., "table_0_row_1_col_2") and values are the cell's text content.
The input data is a separate JSON object.

You must determine which data from the input JSON should go into which cell of the template.
Use the cell's text label and its position (row, column) to resolve ambiguities. For example, if several cells carry the same label, use the label in the cell to the left or above to decide which content goes where.

**Template Structure:**
```json
{structure_json}
```

**Input Data:**
```json
{data_json}
```

**Your Task:**
Create a single JSON object where:
- The keys are the unique cell identifiers from the template structure that should be filled.
- The values are the corresponding values from the input data.

**Example:**
If the template has a cell `table_0_row_4_col_0` with text "Original condition" and an adjacent empty cell `table_0_row_4_col_1`, and the input data has a field `"original_condition": "The structure was well-preserved."`, your output should include:
`"table_0_row_4_col_1": "The structure was well-preserved."`

**IMPORTANT:**
- Only include key-value pairs for cells that need to be filled.
- Do not include cells that contain static labels.
- If a value in the input data is a complex object or array, summarize it into a coherent string suitable for a document cell.
- Return ONLY the final JSON object, without any explanations or markdown formatting.
"#
    )
}

/// Prompt for distilling attachment context into flat field data.
pub fn extraction(context_text: &str) -> String {
    let context = if context_text.trim().is_empty() {
        "(no textual content; rely on the attached images)".to_string()
    } else {
        context_text.to_string()
    };

    format!(
        r#"Extract all factual field data from the following material. The material may combine several sources, each introduced by a `===== filename =====` marker, and images may be attached alongside this text.

**Material:**
{context}

**Your Task:**
Produce a single flat JSON object of field names to values:
- Use short snake_case field names that describe each fact (e.g., "tenant_name", "inspection_date").
- Values are strings; keep dates, identifiers and measurements exactly as written.
- Include every distinct fact you can ground in the material or the attached images; do not invent data.
- Return ONLY the JSON object, without any explanations or markdown formatting.
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CellId;

    #[test]
    fn fill_mapping_embeds_both_documents() {
        let mut structure = TemplateStructure::new();
        structure.insert(CellId::new(0, 1, 2), "Inspector".into());
        let data: LiteralData = serde_json::json!({"inspector": "Kim"})
            .as_object()
            .unwrap()
            .clone();

        let prompt = fill_mapping(&structure, &data);
        assert!(prompt.contains("table_0_row_1_col_2"));
        assert!(prompt.contains("Inspector"));
        assert!(prompt.contains("\"inspector\": \"Kim\""));
        assert!(prompt.contains("Return ONLY the final JSON object"));
    }

    #[test]
    fn extraction_keeps_source_markers() {
        let prompt = extraction("===== notes.txt =====\nTenant Alice, unit 4B\n");
        assert!(prompt.contains("===== notes.txt ====="));
        assert!(prompt.contains("Tenant Alice"));
    }

    #[test]
    fn extraction_with_images_only_notes_the_absence_of_text() {
        let prompt = extraction("   ");
        assert!(prompt.contains("rely on the attached images"));
    }
}
