// Exam generation: input normalization, reference loading, prompt building,
// the two model stages, and the pipeline that sequences them.
// All model calls go through llm_client; nothing here talks HTTP to the model directly.

pub mod handlers;
pub mod pipeline;
pub mod prompts;
pub mod reference;
pub mod request;
pub mod response;
pub mod stages;
