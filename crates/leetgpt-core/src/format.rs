use serde::{Deserialize, Serialize};

/// How assistant answers are formatted by the model and rendered back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderFormat {
    /// The model is asked for HTML fragments, which are sanitized.
    #[default]
    Html,
    /// The model is asked for light markdown, which is converted to HTML.
    Markdown,
}

impl RenderFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderFormat::Html => "html",
            RenderFormat::Markdown => "markdown",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "html" => Some(RenderFormat::Html),
            "markdown" | "md" => Some(RenderFormat::Markdown),
            _ => None,
        }
    }

    pub fn all() -> Vec<RenderFormat> {
        vec![RenderFormat::Html, RenderFormat::Markdown]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            RenderFormat::Html => "HTML fragments",
            RenderFormat::Markdown => "Markdown",
        }
    }
}
