//! Grounded recommendation generation from retrieved films.

pub mod context;
mod generator;
pub mod grounding;

pub use context::format_context;
pub use generator::{AnswerGenerator, AnswerStream, LlmAnswerGenerator, GENERATION_FAILED, NO_MATCHES};
pub use grounding::GroundingReport;
