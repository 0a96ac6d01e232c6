//! Template engine for fixtures and generated stories.
//!
//! Uses Handlebars with the intercepted request as context.

use crate::matcher::MatchContext;
use crate::network::RequestDescriptor;
use handlebars::{Context, Handlebars, Helper, HelperResult, Output, RenderContext};
use serde::Serialize;
use std::collections::HashMap;

/// Template engine for rendering dynamic payloads.
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
}

/// Request context exposed to fixture templates.
#[derive(Debug, Serialize)]
pub struct TemplateContext {
    /// Query parameters
    pub query: HashMap<String, String>,
    /// Regex capture groups from the pathname matcher
    pub captures: HashMap<String, String>,
    /// Request method
    pub method: String,
    /// Request pathname
    pub path: String,
    /// Full request URL
    pub url: String,
}

impl TemplateContext {
    pub fn new(request: &RequestDescriptor, match_ctx: &MatchContext) -> Self {
        Self {
            query: match_ctx.query_params.clone(),
            captures: match_ctx.captures.clone(),
            method: request.method().to_string(),
            path: request.pathname().to_string(),
            url: request.url().to_string(),
        }
    }
}

impl TemplateEngine {
    /// Create a new template engine.
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();

        handlebars.register_helper("now", Box::new(now_helper));
        handlebars.register_helper("random", Box::new(random_helper));
        handlebars.register_helper("default", Box::new(default_helper));
        handlebars.register_helper("upper", Box::new(upper_helper));
        handlebars.register_helper("lower", Box::new(lower_helper));

        // Payloads are JSON, not HTML
        handlebars.register_escape_fn(handlebars::no_escape);

        Self { handlebars }
    }

    /// Render a template string against any serializable data.
    pub fn render<T: Serialize>(
        &self,
        template: &str,
        data: &T,
    ) -> Result<String, handlebars::RenderError> {
        self.handlebars.render_template(template, data)
    }

    /// Render every templated string inside a JSON value.
    pub fn render_json<T: Serialize>(
        &self,
        value: &serde_json::Value,
        data: &T,
    ) -> Result<serde_json::Value, handlebars::RenderError> {
        match value {
            serde_json::Value::String(s) if s.contains("{{") => {
                Ok(serde_json::Value::String(self.render(s, data)?))
            }
            serde_json::Value::Array(arr) => arr
                .iter()
                .map(|v| self.render_json(v, data))
                .collect::<Result<Vec<_>, _>>()
                .map(serde_json::Value::Array),
            serde_json::Value::Object(obj) => {
                let mut rendered = serde_json::Map::new();
                for (k, v) in obj {
                    rendered.insert(k.clone(), self.render_json(v, data)?);
                }
                Ok(serde_json::Value::Object(rendered))
            }
            _ => Ok(value.clone()),
        }
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

// Custom Handlebars helpers

fn now_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let format = h
        .param(0)
        .and_then(|v| v.value().as_str())
        .unwrap_or("%Y-%m-%dT%H:%M:%S%.3fZ");

    out.write(&chrono::Utc::now().format(format).to_string())?;
    Ok(())
}

fn random_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    use rand::Rng;

    let min = h.param(0).and_then(|v| v.value().as_i64()).unwrap_or(0);
    let max = h.param(1).and_then(|v| v.value().as_i64()).unwrap_or(100);
    let value = if max > min {
        rand::thread_rng().gen_range(min..=max)
    } else {
        min
    };
    out.write(&value.to_string())?;
    Ok(())
}

fn default_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let fallback = h.param(1).and_then(|v| v.value().as_str()).unwrap_or("");

    let rendered = match h.param(0).map(|v| v.value()) {
        Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
        Some(serde_json::Value::String(_)) | Some(serde_json::Value::Null) | None => {
            fallback.to_string()
        }
        Some(other) => other.to_string(),
    };
    out.write(&rendered)?;
    Ok(())
}

fn upper_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let value = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    out.write(&value.to_uppercase())?;
    Ok(())
}

fn lower_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let value = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    out.write(&value.to_lowercase())?;
    Ok(())
}
