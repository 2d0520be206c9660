//! Page rendering.
//!
//! Templates ship inside the binary; files under `server.templates_path` with
//! the same relative name replace them, and new ones are added.

use anyhow::{Context, Result};
use handlebars::Handlebars;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::Flash;
use crate::db::MenuEntry;
use crate::domain::Identity;

pub const LAYOUT_TEMPLATE: &str = "layout.html";

const EMBEDDED: &[(&str, &str)] = &[
    (LAYOUT_TEMPLATE, include_str!("../../templates/layout.html")),
    (
        "home/index.html",
        include_str!("../../templates/home/index.html"),
    ),
    (
        "home/users.html",
        include_str!("../../templates/home/users.html"),
    ),
    (
        "home/about.html",
        include_str!("../../templates/home/about.html"),
    ),
    (
        "home/login.html",
        include_str!("../../templates/home/login.html"),
    ),
    (
        "home/register.html",
        include_str!("../../templates/home/register.html"),
    ),
    (
        "home/change-password.html",
        include_str!("../../templates/home/change-password.html"),
    ),
];

/// Everything a page template can reference.
#[derive(Debug, Serialize)]
pub struct PageData<'a> {
    pub title: &'a str,
    pub app_name: &'a str,
    pub version: &'a str,
    pub date: String,
    pub err: Option<String>,
    pub serr: Option<String>,
    pub session: &'a Identity,
    pub model: &'a Value,
    pub menu: &'a [MenuEntry],
}

impl<'a> PageData<'a> {
    #[must_use]
    pub fn new(
        title: &'a str,
        app_name: &'a str,
        session: &'a Identity,
        flash: Flash,
        model: &'a Value,
        menu: &'a [MenuEntry],
    ) -> Self {
        Self {
            title,
            app_name,
            version: env!("CARGO_PKG_VERSION"),
            date: chrono::Local::now().format("%Y-%m-%d").to_string(),
            err: flash.err,
            serr: flash.serr,
            session,
            model,
            menu,
        }
    }
}

pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, data: &PageData<'_>) -> Result<String>;

    fn has_template(&self, template: &str) -> bool;
}

pub struct HandlebarsRenderer {
    registry: Handlebars<'static>,
}

impl HandlebarsRenderer {
    pub fn new(templates_path: &str) -> Result<Self> {
        let mut registry = Handlebars::new();

        for (name, source) in EMBEDDED {
            registry
                .register_template_string(name, source)
                .with_context(|| format!("Invalid embedded template {name}"))?;
        }

        let root = Path::new(templates_path);
        if root.is_dir() {
            let mut count = 0usize;
            for entry in WalkDir::new(root)
                .follow_links(true)
                .into_iter()
                .filter_map(std::result::Result::ok)
                .filter(|e| e.file_type().is_file())
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "html"))
            {
                let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");

                registry
                    .register_template_file(&name, entry.path())
                    .with_context(|| format!("Invalid template {}", entry.path().display()))?;
                debug!(template = %name, "Template loaded");
                count += 1;
            }
            info!("Loaded {} templates from {}", count, root.display());
        } else {
            debug!(
                "Template directory {} not found, using built-in templates",
                root.display()
            );
        }

        Ok(Self { registry })
    }
}

impl TemplateRenderer for HandlebarsRenderer {
    fn render(&self, template: &str, data: &PageData<'_>) -> Result<String> {
        let content = self
            .registry
            .render(template, data)
            .with_context(|| format!("Failed to render {template}"))?;

        if !self.registry.has_template(LAYOUT_TEMPLATE) {
            return Ok(content);
        }

        let mut layout_data = serde_json::to_value(data)?;
        if let Value::Object(fields) = &mut layout_data {
            fields.insert("content".to_string(), Value::String(content));
        }

        self.registry
            .render(LAYOUT_TEMPLATE, &layout_data)
            .context("Failed to render layout")
    }

    fn has_template(&self, template: &str) -> bool {
        self.registry.has_template(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_pages_render_inside_layout() {
        let renderer = HandlebarsRenderer::new("does-not-exist").unwrap();
        let identity = Identity::anonymous("EN");
        let model = Value::Null;
        let data = PageData::new(
            "Login",
            "Memberhub",
            &identity,
            Flash::error("Unknown user or wrong password."),
            &model,
            &[],
        );

        let html = renderer.render("home/login.html", &data).unwrap();
        assert!(html.contains("<title>Login"));
        assert!(html.contains("Unknown user or wrong password."));
        assert!(html.contains("name=\"username\""));
    }

    #[test]
    fn test_model_values_are_escaped() {
        let renderer = HandlebarsRenderer::new("does-not-exist").unwrap();
        let identity = Identity::signed_in("root", "<b>Root</b>", "EN", false);
        let model = json!({});
        let data = PageData::new("Home", "Memberhub", &identity, Flash::default(), &model, &[]);

        let html = renderer.render("home/index.html", &data).unwrap();
        assert!(html.contains("&lt;b&gt;Root&lt;/b&gt;"));
    }

    #[test]
    fn test_unknown_template_fails() {
        let renderer = HandlebarsRenderer::new("does-not-exist").unwrap();
        assert!(!renderer.has_template("home/missing.html"));
    }
}
