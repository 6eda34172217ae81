//! `{placeholder}` templates

use super::RenderContext;
use crate::error::{DialogError, DialogResult};
use serde_json::Value;

/// Substitute `{path}` placeholders from the render data
///
/// `{{` and `}}` produce literal braces. A placeholder naming a missing
/// value is an error rather than silently rendering nothing.
pub fn format_template(template: &str, ctx: &RenderContext<'_>) -> DialogResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut key = String::new();
                let mut closed = false;
                for k in chars.by_ref() {
                    if k == '}' {
                        closed = true;
                        break;
                    }
                    key.push(k);
                }
                if !closed {
                    return Err(DialogError::render(format!(
                        "unclosed placeholder in {template:?}"
                    )));
                }
                let path = key.trim();
                let value = ctx.lookup(path).ok_or_else(|| {
                    DialogError::render(format!("missing value {path:?} for template {template:?}"))
                })?;
                out.push_str(&display_value(value));
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => {
                return Err(DialogError::render(format!(
                    "single '}}' in template {template:?}"
                )));
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn render(template: &str, data: Value) -> DialogResult<String> {
        let Value::Object(data) = data else {
            unreachable!()
        };
        let widget_data = Map::new();
        format_template(template, &RenderContext::new(&data, &widget_data))
    }

    #[test]
    fn test_substitution() {
        let out = render(
            "Hi {name}, you have {count} {{new}} items in {dialog_data.box}",
            json!({"name": "Ann", "count": 3, "dialog_data": {"box": "inbox"}}),
        )
        .unwrap();
        assert_eq!(out, "Hi Ann, you have 3 {new} items in inbox");
    }

    #[test]
    fn test_missing_key_is_error() {
        assert!(render("{nope}", json!({})).is_err());
    }

    #[test]
    fn test_malformed_templates() {
        assert!(render("{open", json!({})).is_err());
        assert!(render("close}", json!({})).is_err());
    }
}
