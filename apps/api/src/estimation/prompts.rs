// Prompt constants for the salary estimation pipeline.
// The field list is not written here: it is rendered from the output schema by the compiler.

/// System prompt for salary estimation. Combined with `llm_client::prompts::TOOL_ONLY_SYSTEM`.
pub const SALARY_ESTIMATE_SYSTEM: &str = "You are an expert career analyst and salary estimator. \
    You produce realistic, well-structured salary analyses grounded in the candidate's CV \
    and the local job market.";

/// Salary estimation prompt template.
/// Replace: {document_reference}, {field_guide}, {tool_name}, {location}
pub const SALARY_ESTIMATE_PROMPT_TEMPLATE: &str = r#"Provide a comprehensive and well-structured salary analysis based on the candidate's CV and job location.

Location: {location}
CV: {document_reference}

Generate a detailed and insightful report. Be thorough and professional.

1. SALARY ESTIMATION
   - Provide a realistic salary range in the local currency.
   - State the currency code (e.g., USD, EUR).
   - Provide a confidence score between 0 and 1 for your estimate.
   - Calculate the 25th, 50th (median) and 75th percentile of the salary range.
     They MUST be in ascending order: 25th <= 50th <= 75th.

2. ANALYSIS
   - Write a brief summary of the current job market for the candidate's likely role in the given location.
   - List the key strengths from the candidate's CV that support the estimate.

3. RECOMMENDATIONS
   - Suggest 2-3 specific skills the candidate could learn or improve to significantly boost their salary potential. Give a clear reason for each skill.
   - Provide a few actionable salary negotiation tips tailored to the candidate's profile.

OUTPUT FIELDS (every field is required; arrays need at least the stated number of entries):
{field_guide}

Your entire output must be a single structured value passed to the `{tool_name}` tool that conforms to its input schema.
Do NOT add fields that are not listed. Do NOT add any text before or after it."#;
