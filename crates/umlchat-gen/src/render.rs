use thiserror::Error;

/// Substring the renderer uses when the source has no diagram type line.
const NO_DIAGRAM_TYPE: &str = "No diagram type detected";

/// The renderer rejected a diagram source.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("diagram could not be built: {message}")]
pub struct RenderError {
    pub message: String,
}

impl RenderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn missing_diagram_type(&self) -> bool {
        self.message.contains(NO_DIAGRAM_TYPE)
    }

    pub fn user_message(&self) -> &'static str {
        if self.missing_diagram_type() {
            "Diagram could not be built: invalid syntax - missing diagram type declaration"
        } else {
            "Diagram could not be built: invalid syntax"
        }
    }
}

/// External Mermaid compiler: source in, SVG out.
pub trait DiagramRenderer: Send + Sync {
    fn render(&self, source: &str) -> Result<String, RenderError>;
}
