use serde_json::{json, Value};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateError(pub String);

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "template error: {}", self.0)
    }
}

impl std::error::Error for TemplateError {}

/// Render a system/user template pair into chat messages.
pub fn render_messages(system: &str, user: &str, inputs: &Value) -> Result<Vec<Value>, TemplateError> {
    let mut messages = Vec::new();
    let system = render_template(system, inputs)?;
    if !system.trim().is_empty() {
        messages.push(json!({ "role": "system", "content": system }));
    }
    messages.push(json!({ "role": "user", "content": render_template(user, inputs)? }));
    Ok(messages)
}

/// Replace `{{ key }}` placeholders with values from `inputs` (an object).
///
/// Strings are inserted verbatim, other values as pretty JSON. Rendering is a
/// single pass, so inserted values are never re-scanned. A placeholder with no
/// matching input is an error so prompts never ship with holes in them.
pub fn render_template(template: &str, inputs: &Value) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return Ok(out);
        };
        let name = after[..end].trim();
        if is_identifier(name) {
            let value = inputs.get(name).ok_or_else(|| {
                TemplateError(format!("missing required input field '{name}'"))
            })?;
            out.push_str(&stringify_value(value));
        } else {
            out.push_str(&rest[start..start + 2 + end + 2]);
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn stringify_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(num) => num.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Null => "None".to_string(),
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_every_spacing_variant() {
        let rendered = render_template(
            "Idea: {{ idea }} / {{idea}} / {{ count}}",
            &json!({ "idea": "bike repair", "count": 3 }),
        )
        .unwrap();
        assert_eq!(rendered, "Idea: bike repair / bike repair / 3");
    }

    #[test]
    fn unresolved_placeholder_is_an_error() {
        let err = render_template("{{ idea }} and {{ problem }}", &json!({ "idea": "x" })).unwrap_err();
        assert_eq!(err.0, "missing required input field 'problem'");
    }

    #[test]
    fn json_braces_in_prompts_are_not_placeholders() {
        let rendered = render_template(
            "Return {{\"score\": 0}} for {{ name }}",
            &json!({ "name": "team" }),
        )
        .unwrap();
        assert!(rendered.ends_with("for team"));
    }

    #[test]
    fn inserted_values_are_not_rescanned() {
        let rendered = render_template(
            "{{ a }} {{ b }}",
            &json!({ "a": "literal {{ b }}", "b": "B" }),
        )
        .unwrap();
        assert_eq!(rendered, "literal {{ b }} B");
    }

    #[test]
    fn empty_system_prompt_is_dropped() {
        let messages = render_messages("  ", "Hello {{ who }}", &json!({ "who": "founder" })).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["content"], "Hello founder");
    }
}
