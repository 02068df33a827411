//! CLI command implementations.

mod ask;
mod config;
mod doctor;
mod eval;
mod index;
mod query;
mod search;
mod serve;

pub use ask::run_ask;
pub use config::run_config;
pub use doctor::run_doctor;
pub use eval::{evaluate, run_eval, EvalRecord, EVAL_QUESTIONS};
pub use index::run_index;
pub use query::run_query;
pub use search::run_search;
pub use serve::{router, run_serve, AppState};
