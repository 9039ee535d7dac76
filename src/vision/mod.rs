//! Vision model clients

pub mod openai;

pub use openai::OpenAiVision;

/// Pull the JSON object out of a model answer
///
/// Handles ```json fences, bare fences and objects wrapped in prose.
pub fn extract_json(text: &str) -> String {
    if let Some(start) = text.find("```json") {
        if let Some(end) = text[start + 7..].find("```") {
            return text[start + 7..start + 7 + end].trim().to_string();
        }
    }

    if let Some(start) = text.find("```") {
        let after_start = &text[start + 3..];
        // Skip language identifier if present
        let content_start = after_start.find('\n').map(|i| i + 1).unwrap_or(0);
        if let Some(end) = after_start[content_start..].find("```") {
            return after_start[content_start..content_start + end]
                .trim()
                .to_string();
        }
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if end > start {
            return text[start..=end].to_string();
        }
    }

    text.trim().to_string()
}
