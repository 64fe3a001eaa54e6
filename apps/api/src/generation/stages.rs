//! The two model stages. Each issues exactly one call and yields a typed result.
//!
//! An upstream failure aborts the request. An empty reply does not: the stage
//! substitutes a fixed placeholder and the pipeline carries on.

use serde::Serialize;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::generation::prompts::{build_formatting_prompt, StagePrompt};
use crate::generation::request::Credential;
use crate::llm_client::{strip_code_fences, CompletionRequest, ModelId, TextModel};

/// Substituted when the generation stage returns nothing.
pub const GENERATION_PLACEHOLDER: &str = "No content generated";
/// Substituted when the formatting stage returns nothing.
pub const FORMATTING_PLACEHOLDER: &str = "No LaTeX content generated";

/// LaTeX headings that open an answer or solution section.
const ANSWER_KEY_HEADINGS: [&str; 6] = [
    "\\section*{answer",
    "\\section{answer",
    "\\subsection*{answer",
    "\\section*{solution",
    "\\section{solution",
    "\\subsection*{solution",
];

/// Plain-text headings, matched only at the start of a line.
const ANSWER_KEY_LINE_PREFIXES: [&str; 4] = ["answer key", "answers:", "solutions:", "solution key"];

/// Raw exam content from stage 1. Never empty.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedContent {
    pub text: String,
    /// True when `text` is the placeholder rather than model output.
    pub placeholder: bool,
}

/// LaTeX document from stage 2. Never empty.
#[derive(Debug, Clone, Serialize)]
pub struct FormattedDocument {
    pub markup: String,
    pub placeholder: bool,
}

/// What the formatting stage asks for besides the content itself.
#[derive(Debug, Clone, Copy)]
pub struct FormattingRules {
    pub min_questions: u32,
    pub include_worked_example: bool,
}

/// Model selection plus credential, shared by both stages.
#[derive(Debug, Clone, Copy)]
pub struct StageCall<'a> {
    pub model: ModelId,
    pub credential: &'a Credential,
    pub max_tokens: u32,
}

impl StageCall<'_> {
    fn request<'p>(&'p self, prompt: &'p StagePrompt) -> CompletionRequest<'p> {
        CompletionRequest {
            model: self.model,
            credential: self.credential.expose(),
            prompt: prompt.as_str(),
            max_tokens: self.max_tokens,
        }
    }
}

/// Stage 1: one call producing raw exam content.
pub async fn run_generation_stage(
    llm: &dyn TextModel,
    prompt: &StagePrompt,
    call: StageCall<'_>,
) -> Result<GeneratedContent, AppError> {
    info!(model = %call.model, "generation stage started");
    let completion = llm
        .complete(call.request(prompt))
        .await
        .map_err(|e| AppError::upstream("generation", e))?;

    let content = match completion.non_empty_text() {
        Some(text) => GeneratedContent {
            text: text.trim().to_string(),
            placeholder: false,
        },
        None => {
            warn!(model = %call.model, "generation stage returned no content, using placeholder");
            GeneratedContent {
                text: GENERATION_PLACEHOLDER.to_string(),
                placeholder: true,
            }
        }
    };
    info!(chars = content.text.len(), "generation stage finished");
    Ok(content)
}

/// Stage 2: one call reformatting stage-1 content into LaTeX.
///
/// The prompt is built here from `generated`, so this stage can only ever
/// format the output of a completed stage 1.
pub async fn run_formatting_stage(
    llm: &dyn TextModel,
    generated: &GeneratedContent,
    rules: FormattingRules,
    call: StageCall<'_>,
) -> Result<FormattedDocument, AppError> {
    info!(model = %call.model, "formatting stage started");
    let prompt = build_formatting_prompt(
        &generated.text,
        rules.min_questions,
        rules.include_worked_example,
    );
    let completion = llm
        .complete(call.request(&prompt))
        .await
        .map_err(|e| AppError::upstream("formatting", e))?;

    let markup = completion
        .non_empty_text()
        .map(strip_code_fences)
        .filter(|m| !m.is_empty());

    let document = match markup {
        Some(markup) => FormattedDocument {
            markup: markup.to_string(),
            placeholder: false,
        },
        None => {
            warn!(model = %call.model, "formatting stage returned no content, using placeholder");
            FormattedDocument {
                markup: FORMATTING_PLACEHOLDER.to_string(),
                placeholder: true,
            }
        }
    };

    // The no-answers rule lives in the prompt only; this check is advisory.
    if suspects_answer_key(&document.markup) {
        warn!("formatted document appears to contain an answer key");
    }
    info!(chars = document.markup.len(), "formatting stage finished");
    Ok(document)
}

/// Heuristic: true if the markup carries an answer/solution heading.
/// Question text that merely mentions solutions does not count.
/// Absence proves nothing about the model honoring the no-answers rule.
pub fn suspects_answer_key(markup: &str) -> bool {
    let lower = markup.to_lowercase();
    if ANSWER_KEY_HEADINGS.iter().any(|h| lower.contains(h)) {
        return true;
    }
    lower.lines().map(str::trim_start).any(|line| {
        matches!(line, "answers" | "solutions")
            || ANSWER_KEY_LINE_PREFIXES.iter().any(|p| line.starts_with(p))
    })
}
