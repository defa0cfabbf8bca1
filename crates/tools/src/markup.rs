//! Inline tool-call markup.
//!
//! Models invoke tools by emitting `<tool name="NAME">{json-args}</tool>`
//! inside their output. The parser extracts every occurrence in order;
//! a call whose JSON body fails to parse is skipped without aborting the
//! scan. `<answer>…</answer>` and `<thought>…</thought>` are reserved
//! tags, not tools.

use serde_json::Value;

/// One parsed tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCall {
    pub name: String,
    pub args: Value,
}

/// Extract all well-formed tool calls from model output, in order.
///
/// Malformed markup (unterminated tags, missing name attribute) ends or
/// skips the scan silently; malformed JSON skips that single call.
pub fn parse_tool_calls(text: &str) -> Vec<ParsedCall> {
    let mut calls = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("<tool") {
        let after_open = &rest[start + "<tool".len()..];

        // The tag header runs to the first '>'.
        let Some(gt) = after_open.find('>') else { break };
        let header = &after_open[..gt];
        let after_header = &after_open[gt + 1..];

        let Some(end) = after_header.find("</tool>") else { break };
        let body = &after_header[..end];
        rest = &after_header[end + "</tool>".len()..];

        let Some(name) = attr_value(header, "name") else {
            continue;
        };

        let trimmed = body.trim();
        let args = if trimmed.is_empty() {
            Value::Object(Default::default())
        } else {
            match serde_json::from_str::<Value>(trimmed) {
                Ok(v) => v,
                Err(e) => {
                    tracing::debug!(tool = name, error = %e, "skipping tool call with malformed JSON");
                    continue;
                }
            }
        };

        calls.push(ParsedCall {
            name: name.to_string(),
            args,
        });
    }

    calls
}

/// Render a call back into wire markup. Inverse of [`parse_tool_calls`]
/// for well-formed calls.
pub fn render_tool_call(name: &str, args: &Value) -> String {
    format!("<tool name=\"{name}\">{args}</tool>")
}

/// Contents of the first `<answer>…</answer>` element, if present.
pub fn extract_answer(text: &str) -> Option<String> {
    extract_tag(text, "answer")
}

/// Contents of the first `<thought>…</thought>` element, if present.
pub fn extract_thought(text: &str) -> Option<String> {
    extract_tag(text, "thought")
}

fn extract_tag(text: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = text.find(&open)? + open.len();
    let end = text[start..].find(&close)? + start;
    Some(text[start..end].trim().to_string())
}

/// Extract and parse the first balanced JSON object in model output.
///
/// Models asked for JSON routinely wrap it in prose or code fences;
/// this scans for the first `{`, tracks brace depth (string- and
/// escape-aware), and parses the balanced slice.
pub fn extract_first_json(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return serde_json::from_str(&text[start..=i]).ok();
                }
            }
            _ => {}
        }
    }
    None
}

fn attr_value<'a>(header: &'a str, attr: &str) -> Option<&'a str> {
    let marker = format!("{attr}=\"");
    let start = header.find(&marker)? + marker.len();
    let end = header[start..].find('"')? + start;
    Some(&header[start..end])
}
