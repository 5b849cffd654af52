//! Splitting provider replies into code and prose.

const FENCE: &str = "```";

/// Contents of the first fenced block tagged `language` (any block when
/// `language` is empty), trimmed.
pub fn extract_code_block(text: &str, language: &str) -> Option<String> {
    let start_marker = format!("{FENCE}{language}");
    let start = text.find(&start_marker)?;

    let mut body_start = start + start_marker.len();
    if text[body_start..].starts_with('\n') {
        body_start += 1;
    }

    let end = text[body_start..].find(FENCE)?;
    Some(text[body_start..body_start + end].trim().to_string())
}

/// Text with every complete fenced block removed, trimmed.
pub fn remove_code_blocks(text: &str) -> String {
    let mut result = text.to_string();
    while let Some(start) = result.find(FENCE) {
        let Some(len) = result[start + FENCE.len()..].find(FENCE) else {
            break;
        };
        result.replace_range(start..start + FENCE.len() + len + FENCE.len(), "");
    }
    result.trim().to_string()
}

/// `(code, explanation)` from a reply. Prefers a block tagged `language`.
pub fn split_response(text: &str, language: &str) -> (String, String) {
    let code = extract_code_block(text, language)
        .filter(|c| !c.is_empty())
        .or_else(|| extract_code_block(text, ""))
        .unwrap_or_default();
    (code, remove_code_blocks(text))
}
