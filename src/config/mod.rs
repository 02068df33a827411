//! Configuration module for Rosebud.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{Prompts, QueryPrompts, RecommendPrompts};
pub use settings::{
    FeedbackSettings, GeneralSettings, GenerationSettings, ModelSettings, PromptSettings,
    RetrievalSettings, Settings, StoreProvider, VectorStoreSettings,
};
