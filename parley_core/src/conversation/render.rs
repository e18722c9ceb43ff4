//! Template rendering for outbound messages.

use minijinja::{Environment, UndefinedBehavior};
use serde_json::Value;
use tracing::warn;

/// Renders `{{ ... }}` templates against a conversation's context.
///
/// A template that fails to render is sent as raw text.
#[derive(Debug)]
pub struct Renderer {
    env: Environment<'static>,
}

impl Renderer {
    #[must_use]
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        // missing keys render empty, like mustache
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        Self { env }
    }

    #[must_use]
    pub fn render_text(&self, template: &str, ctx: &Value) -> String {
        if !template.contains("{{") && !template.contains("{%") {
            return template.to_string();
        }
        match self.env.render_str(template, ctx) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to render template {template:?}: {e}");
                template.to_string()
            }
        }
    }

    /// Render every string leaf of a JSON attachment.
    #[must_use]
    pub fn render_value(&self, value: &Value, ctx: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.render_text(s, ctx)),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.render_value(v, ctx)).collect())
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.render_value(v, ctx)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_nested_fields() {
        let ctx = json!({"responses": {"name": "Ada"}, "identity": {"name": "bot"}});
        let out = Renderer::new().render_text("Hi {{responses.name}}, I am {{ identity.name }}", &ctx);
        assert_eq!(out, "Hi Ada, I am bot");
    }

    #[test]
    fn missing_values_render_empty() {
        let out = Renderer::new().render_text("[{{vars.nothing}}]", &json!({}));
        assert_eq!(out, "[]");
    }

    #[test]
    fn broken_template_falls_back_to_raw() {
        let raw = "Hello {{ name";
        assert_eq!(Renderer::new().render_text(raw, &json!({})), raw);
    }

    #[test]
    fn attachments_render_string_leaves() {
        let ctx = json!({"vars": {"color": "red"}});
        let attachment = json!({"title": "{{vars.color}}", "fields": [{"value": "x {{vars.color}}"}], "n": 3});
        assert_eq!(
            Renderer::new().render_value(&attachment, &ctx),
            json!({"title": "red", "fields": [{"value": "x red"}], "n": 3})
        );
    }
}
