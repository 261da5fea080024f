//! Structured-data block embedded in every page (`__NEXT_DATA__`).

use scraper::{Html, Selector};
use serde_json::Value;

use crate::error::{AppError, Result};

/// Parse the page's structured-data block.
///
/// Returns `Ok(None)` when the page has no such block and an extraction
/// error when the block is not valid JSON.
pub fn read_structured_data(
    document: &Html,
    selector: &Selector,
    context: &str,
) -> Result<Option<Value>> {
    let Some(script) = document.select(selector).next() else {
        return Ok(None);
    };

    let raw: String = script.text().collect();
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| AppError::extraction(context, format!("malformed structured data: {e}")))
}

/// Page properties inside the structured-data block.
pub fn page_props(data: &Value) -> Option<&Value> {
    data.pointer("/props/pageProps")
}

/// Render an identifier that may be encoded as a string or a number.
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
