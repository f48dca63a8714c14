use crate::models::{Criterion, StageKind};

/// Stage 1 system prompt: fact extraction
pub const FACTS_SYSTEM_PROMPT: &str = r#"You are extracting facts from a transcript. You MUST follow these rules:

1. List only facts that are explicitly stated in the transcript.
2. Do NOT infer, speculate, or add outside knowledge.
3. Attribute each fact to its speaker when the transcript names one.
4. Preserve numbers, dates, and names exactly as spoken.
5. Output one fact per line, as a plain bulleted list.

If the transcript contains no extractable facts, say so in one line."#;

/// Stage 2 system prompt: reasoning over the extracted facts
pub const INSIGHTS_SYSTEM_PROMPT: &str = r#"You are analyzing a transcript together with a list of facts extracted from it. You MUST follow these rules:

1. Derive insights: patterns, tensions, decisions, and open questions.
2. Ground every insight in the transcript or the extracted facts.
3. Distinguish what was said from what it implies.
4. Do NOT restate the fact list; build on it.

Output a short sequence of reasoned paragraphs."#;

/// Stage 3 system prompt: final summary
pub const SUMMARY_SYSTEM_PROMPT: &str = r#"You are writing the final summary of a transcript, given the transcript, its extracted facts, and the derived insights. You MUST follow these rules:

1. Cover the essential facts and the strongest insights.
2. Stay faithful to the source; no new claims.
3. Be concise: a reader should grasp the whole conversation in under a minute.

Output plain prose, no headings."#;

/// Built-in system prompt for a stage, used when no override is configured
pub fn default_stage_system_prompt(kind: StageKind) -> &'static str {
    match kind {
        StageKind::Facts => FACTS_SYSTEM_PROMPT,
        StageKind::Insights => INSIGHTS_SYSTEM_PROMPT,
        StageKind::Summary => SUMMARY_SYSTEM_PROMPT,
    }
}

/// Build the user prompt for a stage. Stage n is fed the literal output
/// text of every prior stage alongside the original transcript.
pub fn build_stage_prompt(
    kind: StageKind,
    transcript: &str,
    prior_outputs: &[(StageKind, String)],
) -> String {
    let mut prompt = String::new();
    prompt.push_str("# Transcript\n");
    prompt.push_str(transcript);
    prompt.push('\n');

    for (prior_kind, output) in prior_outputs {
        prompt.push_str(&format!(
            "\n# Prior stage output: {}\n",
            prior_kind.label()
        ));
        prompt.push_str(output);
        prompt.push('\n');
    }

    prompt.push_str(&format!("\n# Task\nProduce the {} for this transcript.\n", kind.label()));
    prompt
}

/// Response grammar the evaluation judge must follow. The parser is
/// strict: a response that omits SCORE or REASON is an evaluation error,
/// never a guess.
pub const JUDGE_RESPONSE_INSTRUCTION: &str = r#"Respond in EXACTLY this format, nothing before it:

SCORE: <number between 0.0 and 1.0>
VERDICT: <pass or fail>
REASON: <one or more lines explaining the score>

The VERDICT line is optional; SCORE and REASON are mandatory."#;

/// Build the user message for an evaluation judge call from the rendered
/// input/output templates.
pub fn build_judge_prompt(rendered_input: &str, rendered_output: &str) -> String {
    format!(
        "# Model input\n{rendered_input}\n\n# Model output\n{rendered_output}\n\n# Instructions\n{JUDGE_RESPONSE_INSTRUCTION}\n"
    )
}

/// Build the comparison judge's system prompt embedding the criteria list
/// and the strict per-criterion response grammar.
pub fn build_comparison_system_prompt(criteria: &[Criterion]) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are judging two independently produced analyses of the same transcript stage. \
Score each on every criterion below, from 0.0 (worst) to 1.0 (best).\n\n## Criteria\n",
    );
    for criterion in criteria {
        prompt.push_str(&format!("- {}: {}\n", criterion.name(), criterion.description()));
    }
    prompt.push_str(
        "\n## Response format\nRespond in EXACTLY this format, one block per criterion, in the order listed above:\n\n",
    );
    for criterion in criteria {
        prompt.push_str(&format!(
            "CRITERION: {}\nSCORE_A: <number between 0.0 and 1.0>\nSCORE_B: <number between 0.0 and 1.0>\n",
            criterion.name()
        ));
    }
    prompt.push_str("REASONING: <one or more lines comparing the two outputs>\n");
    prompt
}

/// Build the comparison judge's user message for one stage
pub fn build_comparison_prompt(stage: StageKind, output_a: &str, output_b: &str) -> String {
    format!(
        "# Stage under comparison: {}\n\n# Output A\n{output_a}\n\n# Output B\n{output_b}\n",
        stage.label()
    )
}
