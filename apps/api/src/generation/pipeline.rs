//! Exam generation pipeline: runs both stages and artifact production for one request.
//!
//! Flow: load_reference → build stage-1 prompt → generation stage →
//!       formatting stage (builds the stage-2 prompt) → artifact production.
//!
//! Strictly sequential. Each step consumes the typed output of the one before it,
//! and the first error aborts the run.

use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::artifacts::{Artifact, ArtifactKey, ArtifactStore};
use crate::errors::AppError;
use crate::generation::prompts::{build_generation_prompt, GenerationPromptInput};
use crate::generation::reference::load_reference;
use crate::generation::request::GenerationRequest;
use crate::generation::stages::{
    run_formatting_stage, run_generation_stage, FormattedDocument, FormattingRules,
    GeneratedContent, StageCall,
};
use crate::llm_client::{ModelId, TextModel};

/// Knobs that distinguish pipeline variants. Loaded from `Config`.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Model for the formatting stage. `None` reuses the request's model.
    pub formatting_model: Option<ModelId>,
    pub honor_additional_instructions: bool,
    pub include_worked_example: bool,
    pub render_pdf: bool,
    pub max_output_tokens: u32,
    pub min_questions: u32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            formatting_model: None,
            honor_additional_instructions: true,
            include_worked_example: false,
            render_pdf: true,
            max_output_tokens: crate::llm_client::DEFAULT_MAX_TOKENS,
            min_questions: 8,
        }
    }
}

/// Everything one successful run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub request_id: Uuid,
    pub generated: GeneratedContent,
    pub formatted: FormattedDocument,
    pub artifact: Artifact,
}

/// Runs the pipeline to completion or first failure.
pub async fn run_pipeline(
    llm: &dyn TextModel,
    store: &ArtifactStore,
    options: &PipelineOptions,
    request: GenerationRequest,
) -> Result<PipelineOutput, AppError> {
    let request_id = Uuid::new_v4();
    let span = info_span!("exam_pipeline", %request_id, model = %request.model);
    run_pipeline_inner(llm, store, options, request, request_id)
        .instrument(span)
        .await
}

async fn run_pipeline_inner(
    llm: &dyn TextModel,
    store: &ArtifactStore,
    options: &PipelineOptions,
    request: GenerationRequest,
    request_id: Uuid,
) -> Result<PipelineOutput, AppError> {
    info!(difficulty = %request.difficulty, "pipeline started");

    // Step 1: Reference material
    let reference = load_reference(request.reference_file.as_ref()).await?;

    // Step 2: Stage-1 prompt
    let additional = if options.honor_additional_instructions {
        request.additional_instructions.as_str()
    } else {
        ""
    };
    let generation_prompt = build_generation_prompt(GenerationPromptInput {
        topic_prompt: &request.topic_prompt,
        reference: &reference,
        difficulty: request.difficulty,
        additional_instructions: additional,
        min_questions: options.min_questions,
    });

    // Step 3: Generation stage
    let generated = run_generation_stage(
        llm,
        &generation_prompt,
        StageCall {
            model: request.model,
            credential: &request.credential,
            max_tokens: options.max_output_tokens,
        },
    )
    .await?;

    // Step 4: Formatting stage (builds its prompt from the stage-1 output)
    let formatted = run_formatting_stage(
        llm,
        &generated,
        FormattingRules {
            min_questions: options.min_questions,
            include_worked_example: options.include_worked_example,
        },
        StageCall {
            model: options.formatting_model.unwrap_or(request.model),
            credential: &request.credential,
            max_tokens: options.max_output_tokens,
        },
    )
    .await?;

    // Step 5: Artifacts, keyed by this request
    let artifact = store
        .produce(&ArtifactKey::from_uuid(request_id), &formatted, options.render_pdf)
        .await?;

    info!(
        generated_placeholder = generated.placeholder,
        formatted_placeholder = formatted.placeholder,
        "pipeline finished"
    );

    Ok(PipelineOutput {
        request_id,
        generated,
        formatted,
        artifact,
    })
}
