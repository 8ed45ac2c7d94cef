//! Tool call extraction from free-form model output
//!
//! The model is told to request tools with blocks like
//!
//! ```text
//! TOOL_CALL: weather
//! ARGUMENTS: {"city": "Paris"}
//! ```
//!
//! Blocks are found with a regex for the markers and a brace scan for the
//! argument object. Output with no such blocks gets one more try as a legacy
//! `{"tool_calls": [...]}` JSON document before being treated as prose.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::id::generate_tool_call_id;

use super::types::{ToolCall, ToolCatalog, ToolResponse};

static TOOL_CALL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[ \t]*TOOL_CALL:\s*["'`]?([\w.\-]+)["'`]?\s*ARGUMENTS:[ \t]*"#)
        .expect("tool call pattern is a valid regex")
});

/// Split model output into residual text and tool calls.
///
/// With an empty catalog the text is returned untouched; tools were never
/// offered, so anything that looks like a call is just text.
pub fn extract_tool_calls(text: &str, catalog: &ToolCatalog) -> ToolResponse {
    if catalog.is_empty() {
        return ToolResponse::text_only(text);
    }

    let response = extract_marked_blocks(text).or_else(|| extract_legacy_json(text));
    let Some(response) = response else {
        return ToolResponse::text_only(text);
    };

    for call in &response.tool_calls {
        if !catalog.contains(&call.name) {
            log::warn!("Model requested tool '{}' which is not in the catalog", call.name);
        }
    }
    log::debug!("Extracted {} tool call(s)", response.tool_calls.len());

    response
}

fn extract_marked_blocks(text: &str) -> Option<ToolResponse> {
    let mut tool_calls = Vec::new();
    let mut residual = String::with_capacity(text.len());
    let mut cursor = 0;

    while let Some(caps) = TOOL_CALL_PATTERN.captures_at(text, cursor) {
        let (Some(block), Some(name)) = (caps.get(0), caps.get(1)) else {
            break;
        };

        let (args_start, args_end) = arguments_span(text, block.end());
        let raw_arguments = text[args_start..args_end].trim_end();

        residual.push_str(&text[cursor..block.start()]);
        cursor = skip_line_break(text, args_end);

        tool_calls.push(ToolCall::new(generate_tool_call_id(), name.as_str(), raw_arguments));
    }

    if tool_calls.is_empty() {
        return None;
    }

    residual.push_str(&text[cursor..]);
    let residual = residual.trim();
    Some(ToolResponse {
        text: (!residual.is_empty()).then(|| residual.to_string()),
        tool_calls,
    })
}

/// Byte range of the arguments following the `ARGUMENTS:` marker.
///
/// An object may start on a later line; the scan finds its matching close
/// brace, skipping braces inside JSON strings, and an unterminated object
/// runs to the end of the text. Arguments that do not open with a brace run
/// to the end of the line.
fn arguments_span(text: &str, start: usize) -> (usize, usize) {
    let rest = &text[start..];
    let trimmed = rest.trim_start();
    if !trimmed.starts_with('{') {
        return (start, rest.find('\n').map_or(text.len(), |i| start + i));
    }

    let start = start + (rest.len() - trimmed.len());
    let rest = trimmed;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in rest.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return (start, start + offset + 1);
                }
            }
            _ => {}
        }
    }

    (start, text.len())
}

/// Skip trailing spaces and a single line break after a block
fn skip_line_break(text: &str, mut pos: usize) -> usize {
    let bytes = text.as_bytes();
    while pos < bytes.len() && (bytes[pos] == b' ' || bytes[pos] == b'\t') {
        pos += 1;
    }
    if bytes.get(pos) == Some(&b'\r') {
        pos += 1;
    }
    if bytes.get(pos) == Some(&b'\n') {
        pos += 1;
    }
    pos
}

/// Back-compat: `{"content": ..., "tool_calls": [{"id", "function": {"name", "arguments"}}]}`
fn extract_legacy_json(text: &str) -> Option<ToolResponse> {
    let value: Value = serde_json::from_str(text.trim()).ok()?;
    let entries = value.get("tool_calls")?.as_array()?;

    let tool_calls: Vec<ToolCall> = entries.iter().filter_map(legacy_call).collect();
    if tool_calls.is_empty() {
        return None;
    }

    let text = value
        .get("content")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    Some(ToolResponse { text, tool_calls })
}

fn legacy_call(entry: &Value) -> Option<ToolCall> {
    let function = entry.get("function")?;
    let name = function.get("name")?.as_str()?;

    let raw_arguments = match function.get("arguments") {
        Some(Value::String(encoded)) => encoded.clone(),
        Some(Value::Null) | None => "{}".to_string(),
        Some(other) => other.to_string(),
    };

    let id = entry
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(generate_tool_call_id);

    Some(ToolCall::new(id, name, raw_arguments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolDefinition;

    fn catalog() -> ToolCatalog {
        ToolCatalog::new()
            .with_tool(ToolDefinition::named("weather"))
            .with_tool(ToolDefinition::named("search"))
    }

    #[test]
    fn test_extracts_single_call_and_trims_residual() {
        let text = "Let me check.\nTOOL_CALL: weather\nARGUMENTS: {\"city\":\"Paris\"}\nDone.";
        let response = extract_tool_calls(text, &catalog());

        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "weather");
        assert_eq!(response.tool_calls[0].raw_arguments, "{\"city\":\"Paris\"}");
        assert!(response.tool_calls[0].id.starts_with("call-"));
        assert_eq!(response.text.as_deref(), Some("Let me check.\nDone."));
    }

    #[test]
    fn test_empty_catalog_skips_extraction() {
        let text = "Let me check.\nTOOL_CALL: weather\nARGUMENTS: {\"city\":\"Paris\"}\nDone.";
        let response = extract_tool_calls(text, &ToolCatalog::new());

        assert!(response.tool_calls.is_empty());
        assert_eq!(response.text.as_deref(), Some(text));
    }

    #[test]
    fn test_multiple_calls_with_indentation() {
        let text = "  TOOL_CALL: weather\n  ARGUMENTS: {\"city\": \"Oslo\"}\n\tTOOL_CALL:   search \n\tARGUMENTS:   {\"q\": \"fjords\"}";
        let response = extract_tool_calls(text, &catalog());

        let names: Vec<&str> = response.tool_calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["weather", "search"]);
        assert_eq!(response.tool_calls[1].raw_arguments, "{\"q\": \"fjords\"}");
        assert!(response.text.is_none());
        assert_ne!(response.tool_calls[0].id, response.tool_calls[1].id);
    }

    #[test]
    fn test_nested_and_multiline_arguments() {
        let text = "TOOL_CALL: search\nARGUMENTS: {\n  \"filter\": {\"lang\": \"en\"},\n  \"q\": \"a } in a string\"\n}\nAfter.";
        let response = extract_tool_calls(text, &catalog());

        assert_eq!(response.tool_calls.len(), 1);
        let args: Value = response.tool_calls[0].arguments().unwrap();
        assert_eq!(args["filter"]["lang"], "en");
        assert_eq!(args["q"], "a } in a string");
        assert_eq!(response.text.as_deref(), Some("After."));
    }

    #[test]
    fn test_quoted_tool_name() {
        let response = extract_tool_calls("TOOL_CALL: `weather`\nARGUMENTS: {}", &catalog());
        assert_eq!(response.tool_calls[0].name, "weather");
        assert_eq!(response.tool_calls[0].raw_arguments, "{}");
    }

    #[test]
    fn test_malformed_arguments_are_kept_verbatim() {
        let response = extract_tool_calls("TOOL_CALL: weather\nARGUMENTS: {\"city\": Paris", &catalog());
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].raw_arguments, "{\"city\": Paris");
    }

    #[test]
    fn test_non_object_arguments_run_to_end_of_line() {
        let response = extract_tool_calls("TOOL_CALL: weather\nARGUMENTS: Paris please\nThanks", &catalog());
        assert_eq!(response.tool_calls[0].raw_arguments, "Paris please");
        assert_eq!(response.text.as_deref(), Some("Thanks"));
    }

    #[test]
    fn test_unknown_tool_is_still_returned() {
        let response = extract_tool_calls("TOOL_CALL: launch\nARGUMENTS: {}", &catalog());
        assert_eq!(response.tool_calls[0].name, "launch");
    }

    #[test]
    fn test_legacy_json_fallback() {
        let text = r#"{"content": "Checking", "tool_calls": [
            {"id": "abc", "function": {"name": "weather", "arguments": "{\"city\":\"Rome\"}"}},
            {"function": {"name": "search", "arguments": {"q": "pasta"}}}
        ]}"#;
        let response = extract_tool_calls(text, &catalog());

        assert_eq!(response.text.as_deref(), Some("Checking"));
        assert_eq!(response.tool_calls.len(), 2);
        assert_eq!(response.tool_calls[0].id, "abc");
        assert_eq!(response.tool_calls[0].raw_arguments, "{\"city\":\"Rome\"}");
        assert_eq!(response.tool_calls[1].name, "search");
        let args: Value = response.tool_calls[1].arguments().unwrap();
        assert_eq!(args["q"], "pasta");
    }

    #[test]
    fn test_plain_prose_is_residual() {
        let response = extract_tool_calls("The weather in Paris is mild.", &catalog());
        assert!(response.tool_calls.is_empty());
        assert_eq!(response.text.as_deref(), Some("The weather in Paris is mild."));
    }

    #[test]
    fn test_json_without_tool_calls_is_residual() {
        let text = r#"{"answer": 42}"#;
        let response = extract_tool_calls(text, &catalog());
        assert!(response.tool_calls.is_empty());
        assert_eq!(response.text.as_deref(), Some(text));
    }

    #[test]
    fn test_arguments_span_ignores_escaped_quotes() {
        let text = r#"{"a": "say \"}\" now"} tail"#;
        assert_eq!(arguments_span(text, 0), (0, text.len() - " tail".len()));
    }

    #[test]
    fn test_arguments_on_the_next_line() {
        let text = "TOOL_CALL: weather\nARGUMENTS:\n{\"city\":\"Paris\"}\nDone.";
        let response = extract_tool_calls(text, &catalog());

        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].raw_arguments, "{\"city\":\"Paris\"}");
        assert_eq!(response.text.as_deref(), Some("Done."));
    }

    #[test]
    fn test_name_on_the_next_line() {
        let text = "TOOL_CALL:\n  weather\nARGUMENTS: {\"city\":\"Oslo\"}";
        let response = extract_tool_calls(text, &catalog());

        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "weather");
        assert_eq!(response.tool_calls[0].raw_arguments, "{\"city\":\"Oslo\"}");
        assert_eq!(response.text, None);
    }

    #[test]
    fn test_crlf_line_endings() {
        let text = "Checking.\r\nTOOL_CALL: weather\r\nARGUMENTS:\r\n  {\"city\":\"Lima\"}\r\nTOOL_CALL: search\r\nARGUMENTS: pasta\r\nDone.";
        let response = extract_tool_calls(text, &catalog());

        assert_eq!(response.tool_calls.len(), 2);
        assert_eq!(response.tool_calls[0].raw_arguments, "{\"city\":\"Lima\"}");
        assert_eq!(response.tool_calls[1].name, "search");
        assert_eq!(response.tool_calls[1].raw_arguments, "pasta");
        assert_eq!(response.text.as_deref(), Some("Checking.\r\nDone."));
    }

    #[test]
    fn test_empty_arguments_do_not_swallow_next_line() {
        let response = extract_tool_calls("TOOL_CALL: search\nARGUMENTS:\nThanks", &catalog());
        assert_eq!(response.tool_calls[0].raw_arguments, "");
        assert_eq!(response.text.as_deref(), Some("Thanks"));
    }
}
