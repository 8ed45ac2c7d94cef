//! Tool-use instructions for the model
//!
//! The runtime has no native tool calling, so the catalog and the call format
//! are described in plain text and prepended to the conversation.

use super::types::ToolCatalog;

/// Describe the available tools and the `TOOL_CALL:` / `ARGUMENTS:` format.
///
/// Returns `None` for an empty catalog.
pub fn render_tool_instructions(catalog: &ToolCatalog) -> Option<String> {
    if catalog.is_empty() {
        return None;
    }

    let mut out = String::from("You can call the following tools:\n");
    for tool in catalog.iter() {
        out.push_str("\n- ");
        out.push_str(&tool.name);
        if let Some(description) = &tool.description {
            out.push_str(": ");
            out.push_str(description);
        }
        out.push_str("\n  Parameters: ");
        out.push_str(&tool.parameters.to_string());
        out.push('\n');
    }

    out.push_str(
        "\nTo call a tool, reply with these two lines:\n\
         TOOL_CALL: <tool name>\n\
         ARGUMENTS: <JSON object matching the tool's parameters>\n\
         \n\
         Repeat the two lines for each tool you need. \
         If no tool is needed, answer normally.",
    );

    Some(out)
}
