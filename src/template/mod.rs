//! # Template Rendering
//!
//! Renders the `configmapTemplate`/`secretTemplate` strings from a
//! `ProjectMappingSpec` against a fixed set of context variables using the
//! `liquid` crate, a Rust port of Shopify Liquid chosen to satisfy the
//! "any Liquid-compatible templating engine" contract (§5).

use liquid::model::Value as LiquidValue;
use liquid::{Object, ParserBuilder};

use crate::error::ReconcileError;

/// The fixed set of variables exposed to a template. Field names and shape
/// are part of the external contract (§5) and must not be renamed.
pub struct TemplateContext<'a> {
    pub project: &'a str,
    pub project_heirarchy: &'a serde_json::Value,
    pub parameters: &'a [(String, String, bool)],
    pub parameter_origins: &'a std::collections::HashMap<String, String>,
    pub debug: bool,
}

/// Renders a template string against a [`TemplateContext`].
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, context: &TemplateContext<'_>) -> Result<String, ReconcileError>;
}

/// `liquid`-backed implementation of [`TemplateRenderer`].
#[derive(Debug, Default, Clone, Copy)]
pub struct LiquidRenderer;

impl TemplateRenderer for LiquidRenderer {
    fn render(&self, template: &str, context: &TemplateContext<'_>) -> Result<String, ReconcileError> {
        let parser = ParserBuilder::with_stdlib()
            .build()
            .map_err(|e| ReconcileError::Template(format!("failed to build parser: {e}")))?;

        let parsed = parser
            .parse(template)
            .map_err(|e| ReconcileError::Template(format!("parse error: {e}")))?;

        let globals = build_globals(context);

        parsed
            .render(&globals)
            .map_err(|e| ReconcileError::Template(format!("render error: {e}")))
    }
}

fn build_globals(context: &TemplateContext<'_>) -> Object {
    let mut globals = Object::new();

    globals.insert("project".into(), LiquidValue::scalar(context.project.to_string()));

    globals.insert("project_heirarchy".into(), json_to_liquid(context.project_heirarchy));

    globals.insert(
        "parameters".into(),
        LiquidValue::Array(
            context
                .parameters
                .iter()
                .map(|(key, value, secret)| {
                    let mut entry = Object::new();
                    entry.insert("key".into(), LiquidValue::scalar(key.clone()));
                    entry.insert("value".into(), LiquidValue::scalar(value.clone()));
                    entry.insert("secret".into(), LiquidValue::scalar(*secret));
                    LiquidValue::Object(entry)
                })
                .collect(),
        ),
    );

    let mut origins = Object::new();
    for (key, origin) in context.parameter_origins {
        origins.insert(key.clone().into(), LiquidValue::scalar(origin.clone()));
    }
    globals.insert("parameter_origins".into(), LiquidValue::Object(origins));

    globals.insert("debug".into(), LiquidValue::scalar(context.debug));

    globals
}

/// Convert a `serde_json::Value` into the equivalent `liquid::model::Value`,
/// used for the nested `project_heirarchy` tree (§3).
fn json_to_liquid(value: &serde_json::Value) -> LiquidValue {
    match value {
        serde_json::Value::Null => LiquidValue::Nil,
        serde_json::Value::Bool(b) => LiquidValue::scalar(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                LiquidValue::scalar(i)
            } else {
                LiquidValue::scalar(n.as_f64().unwrap_or_default())
            }
        }
        serde_json::Value::String(s) => LiquidValue::scalar(s.clone()),
        serde_json::Value::Array(items) => LiquidValue::Array(items.iter().map(json_to_liquid).collect()),
        serde_json::Value::Object(map) => {
            let mut obj = Object::new();
            for (key, val) in map {
                obj.insert(key.clone().into(), json_to_liquid(val));
            }
            LiquidValue::Object(obj)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn renders_project_and_parameters() {
        let params = vec![
            ("DATABASE_URL".to_string(), "postgres://db".to_string(), false),
            ("API_KEY".to_string(), "secret123".to_string(), true),
        ];
        let origins = HashMap::new();
        let hierarchy = serde_json::json!({"myapp": {"root": {}}});
        let context = TemplateContext {
            project: "myapp",
            project_heirarchy: &hierarchy,
            parameters: &params,
            parameter_origins: &origins,
            debug: false,
        };

        let template = "name: {{ project }}\n{% for param in parameters %}{{ param.key }}={{ param.value }}\n{% endfor %}";
        let rendered = LiquidRenderer.render(template, &context).unwrap();

        assert!(rendered.contains("name: myapp"));
        assert!(rendered.contains("DATABASE_URL=postgres://db"));
        assert!(rendered.contains("API_KEY=secret123"));
    }

    #[test]
    fn hierarchy_tree_is_walkable_in_template() {
        let params = vec![];
        let origins = HashMap::new();
        let hierarchy = serde_json::json!({"myapp": {"root": {}}});
        let context = TemplateContext {
            project: "myapp",
            project_heirarchy: &hierarchy,
            parameters: &params,
            parameter_origins: &origins,
            debug: false,
        };

        let rendered = LiquidRenderer
            .render("{% if project_heirarchy.myapp %}nested{% endif %}", &context)
            .unwrap();
        assert_eq!(rendered, "nested");
    }

    #[test]
    fn parse_error_becomes_template_error() {
        let params = vec![];
        let origins = HashMap::new();
        let hierarchy = serde_json::json!({});
        let context = TemplateContext {
            project: "p",
            project_heirarchy: &hierarchy,
            parameters: &params,
            parameter_origins: &origins,
            debug: false,
        };

        let result = LiquidRenderer.render("{% if %}", &context);
        assert!(result.is_err());
    }
}
