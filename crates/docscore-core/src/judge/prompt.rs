//! Prompt builders for the judge.

use crate::domain::{DocTree, LeafJudgment};

/// System prompt shared by every judge call.
pub const SYSTEM_PROMPT: &str = r#"You are a documentation evaluation expert. Your task is to evaluate whether a specific criteria is documented in the given documentation tree.

# OBJECTIVE
For each leaf-level criteria provided, determine if the documentation adequately covers that criteria using a binary evaluation (0 or 1).

# EVALUATION CRITERIA
- **1 (Documented)**: The criteria is explained, described, or mentioned in the documentation
- **0 (Not Documented)**: The criteria is not mentioned or missing from the documentation

# EVALUATION PROCESS
1. Analyze the provided documentation tree structure and content
2. For each criteria, search through the documentation to find relevant coverage
3. Make a binary decision: does the documentation mention this criteria? Consider both direct explanations and implicit coverage.
4. Provide brief reasoning for your decision

# OUTPUT FORMAT
Respond with:
```json
{
  "criteria": "The specific criteria text",
  "score": 0 or 1,
  "reasoning": "Brief explanation of why this score was assigned",
  "evidence": "Specific documentation sections or content that support the score"
}
```"#;

const REPLY_FORMAT: &str = r#"{
  "criteria": "The specific criteria text",
  "score": 0 or 1,
  "reasoning": "Brief explanation of why this score was assigned",
  "evidence": "Specific documentation sections or content that support the score"
}"#;

/// Prompt for the first attempt on a leaf.
pub fn build_evaluation_prompt(requirement: &str, docs: &DocTree) -> String {
    format!(
        "Evaluate this criteria against the documentation:\n\n\
         Criteria: \"{requirement}\"\n\n\
         Documentation tree:\n```json\n{docs}\n```\n\n\
         Find the documentation section that covers this criteria, then decide \
         whether the criteria is mentioned. Respond with the exact JSON format specified.",
        docs = docs.render_for_prompt(),
    )
}

/// Prompt for a retry, carrying the failed attempt so the judge can correct it.
pub fn build_retry_prompt(requirement: &str, docs: &DocTree, previous: &LeafJudgment) -> String {
    format!(
        "RETRY EVALUATION - Previous attempt failed. Please be extra careful with the JSON format.\n\
         Previous attempt:\n\"\"\"\n{evidence}\n\"\"\"\n\
         Got error: {reasoning}\n\n\
         Evaluate this criteria against the documentation:\n\n\
         Criteria: \"{requirement}\"\n\n\
         Documentation tree:\n```json\n{docs}\n```\n\n\
         IMPORTANT: You must respond with valid JSON in exactly this format:\n{REPLY_FORMAT}",
        evidence = previous.evidence,
        reasoning = previous.reasoning,
        docs = docs.render_for_prompt(),
    )
}
