//! Model lifecycle and question answering for Ragbot.

pub mod pipeline;
pub mod prompt;
pub mod registry;

pub use pipeline::{ConversationalPipeline, PipelineSettings};
pub use prompt::{SYSTEM_PROMPT, render_prompt};
pub use registry::{ModelRegistry, RegistryLimits, SessionState};
