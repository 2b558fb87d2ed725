// Shared prompt fragments for schema-guided calls.
// Each pipeline that needs LLM calls defines its own prompts.rs alongside it;
// this file holds the cross-cutting pieces.

/// System prompt fragment that enforces tool-only output.
pub const TOOL_ONLY_SYSTEM: &str = "You MUST answer by calling the provided tool exactly once. \
    Do NOT include any text outside the tool call. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";
