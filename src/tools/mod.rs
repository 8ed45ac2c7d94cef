//! Tool calling over plain-text generation
//!
//! Tools are advertised to the model in its instructions and requested back
//! as text, which the extractor turns into [`ToolCall`]s.

pub mod extractor;
pub mod prompt;
pub mod types;

pub use extractor::extract_tool_calls;
pub use prompt::render_tool_instructions;
pub use types::{ToolCall, ToolCatalog, ToolDefinition, ToolResponse};
