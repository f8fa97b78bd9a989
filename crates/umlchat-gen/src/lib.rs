pub mod assistant;
pub mod classify;
pub mod engine;
pub mod error;
pub mod guidance;
pub mod precheck;
pub mod prompt;
pub mod render;
pub mod sanitize;
pub mod session;

pub use assistant::{fallback_title, DiagramAssistant};
pub use classify::{classify, DiagramCategory};
pub use engine::{ChatCompletionsGenerator, LlmGenerator, TextGenerator, UnconfiguredGenerator};
pub use error::{GenerationError, Operation};
pub use guidance::{GuidanceEntry, GuidanceLibrary};
pub use precheck::precheck_looks_valid;
pub use prompt::{Composer, GenerationRequest};
pub use render::{DiagramRenderer, RenderError};
pub use sanitize::sanitize;
pub use session::Session;

pub use tokio_util::sync::CancellationToken;
