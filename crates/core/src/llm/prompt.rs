//! Instructions sent alongside every recommendation request.

const RECOMMENDATION_SCHEMA: &str = r#"{
    "protocol_name": "string",
    "protocol_description": "string",
    "protocol_steps": [
        {
            "step_number": 1,
            "description": "string",
            "estimated_time": "string",
            "potential_fees": "string"
        }
    ],
    "protocol_link": "string",
    "estimated_slippage": "string",
    "overall_benefit": "string",
    "risks": ["string"],
    "alternative_protocols": ["string"]
}"#;

pub fn recommendation_schema() -> &'static str {
    RECOMMENDATION_SCHEMA
}

/// System instruction for direct (ungrounded) generation.
pub fn direct_system_instruction() -> String {
    system_instruction(&[])
}

/// System instruction for generation grounded in accumulated market data.
pub fn grounded_system_instruction() -> String {
    system_instruction(&[
        "- For every single response, include the 'total slippage', 'net gains', \
         'safe and recommended protocols', 'estimate time for swap' and 'potential fees' as statistics",
        "- Base figures on the provided market data documents when they are relevant",
    ])
}

fn system_instruction(extra_rules: &[&str]) -> String {
    let mut lines = vec![
        "Context: You are an expert DeFi Optimizer.",
        "Instructions:",
        "- Analyze the user's query about DeFi protocols",
        "- Provide a comprehensive, step-by-step response",
        "- Include protocol recommendations, potential benefits, and risks",
        "- Format response as a clean, informative JSON object",
    ];
    lines.extend_from_slice(extra_rules);
    lines.push("");
    lines.push("Required JSON Structure:");
    lines.push(RECOMMENDATION_SCHEMA);
    lines.join("\n")
}

pub fn repair_prompt(previous_output: &str, error: &str) -> String {
    format!(
        "Your previous message did NOT match the required JSON structure ({error}).\n\n\
TASK: Output ONLY a single JSON object that exactly matches the structure below.\n\
- Do NOT include any markdown, prose, or code fences.\n\
- protocol_steps MUST be non-empty and numbered 1..n.\n\
- Every key in the structure MUST be present.\n\n\
STRUCTURE:\n{RECOMMENDATION_SCHEMA}\n\n\
INVALID OUTPUT (for reference only; DO NOT copy verbatim):\n{previous_output}"
    )
}
