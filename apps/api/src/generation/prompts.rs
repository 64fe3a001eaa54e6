// All model prompt templates for the exam pipeline.
// Builders here are pure: identical inputs always yield byte-identical prompts.

use std::fmt;

use crate::generation::reference::ReferenceText;
use crate::generation::request::Difficulty;

/// Stage-1 template. Placeholders: {topic}, {reference}, {difficulty},
/// {min_questions}, {additional}
pub const GENERATION_PROMPT_TEMPLATE: &str = r#"Create a test based on the following input.

Prompt: {topic}

Reference Material:
{reference}

Difficulty: {difficulty}

Difficulty scale: 1 is the easiest and 10 is the hardest. The default level is 5, which is medium difficulty. The user chose the difficulty above; calibrate every question to it.

Requirements:
1. Include at least {min_questions} questions, written in the style of a college-level university exam.
2. Identify the precise subject and topic the prompt is asking about. Most questions must be directly about that topic; a minority may cover closely related material.
3. The goal is to make the student excel at the subject, even if the questions become challenging.
4. Number every question.{additional}"#;

/// Appended to the stage-1 prompt when the request carries extra instructions.
pub const ADDITIONAL_INSTRUCTIONS_SECTION: &str = "\n\nAdditional Instructions: {instructions}";

/// Shown in place of reference material when no file was uploaded.
pub const NO_REFERENCE_MATERIAL: &str = "(none provided)";

/// Stage-2 template. Placeholders: {min_questions}, {example}, {content}
pub const FORMATTING_PROMPT_TEMPLATE: &str = r#"Reformat the exam below into a single complete LaTeX document.

HARD RULES:
1. Do NOT change any question. Keep the wording of every question exactly as given.
2. Keep the questions in their original order. Proofread formatting only.
3. Produce perfect, compilable LaTeX: one \documentclass, one document environment, every question numbered.
4. The document must contain all of the questions, at least {min_questions} of them.
5. Do NOT include answers, solutions, hints, or an answer key. The students will need to solve it themselves.
6. Output only the LaTeX source. No commentary before or after it.{example}

Content:
{content}"#;

/// Wraps the worked example when it is included. Placeholder: {example_document}
pub const WORKED_EXAMPLE_SECTION: &str = r#"

Below is an example of the expected document structure. Use it ONLY as a structural reference. Do NOT copy its questions, its title, or any of its text into your output.

--- BEGIN STRUCTURE EXAMPLE ---
{example_document}
--- END STRUCTURE EXAMPLE ---"#;

/// One complete exam document used to anchor stage-2 output structure.
pub const WORKED_EXAMPLE_DOCUMENT: &str = r#"\documentclass[11pt]{article}
\usepackage[margin=1in]{geometry}
\usepackage{amsmath}
\usepackage{enumitem}

\title{Introductory Thermodynamics: Practice Exam}
\date{}

\begin{document}
\maketitle

\noindent\textbf{Instructions:} Answer every question. Show all work.

\section*{Part I: Short Answer}
\begin{enumerate}[label=\textbf{\arabic*.}]
  \item State the first law of thermodynamics for a closed system.
  \item Define an isothermal process and give one physical example.
\end{enumerate}

\section*{Part II: Problems}
\begin{enumerate}[label=\textbf{\arabic*.}, resume]
  \item An ideal gas expands from $2.0\,\mathrm{L}$ to $5.0\,\mathrm{L}$ at a constant pressure of $1.5\,\mathrm{atm}$. Compute the work done by the gas.
  \item A heat engine absorbs $800\,\mathrm{J}$ and rejects $500\,\mathrm{J}$ per cycle.
  \begin{enumerate}[label=(\alph*)]
    \item What is its efficiency?
    \item What is the maximum efficiency if it operates between $600\,\mathrm{K}$ and $300\,\mathrm{K}$?
  \end{enumerate}
\end{enumerate}

\end{document}"#;

/// A fully built prompt for one stage. Constructed fresh per stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePrompt(String);

impl StagePrompt {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StagePrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inputs to the stage-1 prompt.
#[derive(Debug, Clone, Copy)]
pub struct GenerationPromptInput<'a> {
    pub topic_prompt: &'a str,
    pub reference: &'a ReferenceText,
    pub difficulty: Difficulty,
    /// Already filtered by configuration: empty means "omit the section".
    pub additional_instructions: &'a str,
    pub min_questions: u32,
}

pub fn build_generation_prompt(input: GenerationPromptInput<'_>) -> StagePrompt {
    let reference = if input.reference.is_empty() {
        NO_REFERENCE_MATERIAL
    } else {
        input.reference.as_str()
    };

    let instructions = input.additional_instructions.trim();
    let additional = if instructions.is_empty() {
        String::new()
    } else {
        fill_template(ADDITIONAL_INSTRUCTIONS_SECTION, &[("instructions", instructions)])
    };

    let difficulty = input.difficulty.to_string();
    let min_questions = input.min_questions.to_string();
    StagePrompt(fill_template(
        GENERATION_PROMPT_TEMPLATE,
        &[
            ("topic", input.topic_prompt),
            ("reference", reference),
            ("difficulty", &difficulty),
            ("min_questions", &min_questions),
            ("additional", &additional),
        ],
    ))
}

pub fn build_formatting_prompt(
    generated: &str,
    min_questions: u32,
    include_worked_example: bool,
) -> StagePrompt {
    let example = if include_worked_example {
        fill_template(
            WORKED_EXAMPLE_SECTION,
            &[("example_document", WORKED_EXAMPLE_DOCUMENT)],
        )
    } else {
        String::new()
    };

    let min_questions = min_questions.to_string();
    StagePrompt(fill_template(
        FORMATTING_PROMPT_TEMPLATE,
        &[
            ("min_questions", &min_questions),
            ("example", &example),
            ("content", generated),
        ],
    ))
}

/// Single-pass `{key}` substitution. Substituted values are never rescanned, so
/// user text containing `{topic}` or similar stays literal. Unknown `{...}`
/// sequences (LaTeX groups) are copied through untouched.
fn fill_template(template: &str, pairs: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let replaced = after.find('}').and_then(|end| {
            let key = &after[..end];
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v, end))
        });
        match replaced {
            Some((value, end)) => {
                out.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
