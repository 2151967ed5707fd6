//! Persisted REML fits.

pub mod reml_model;
pub mod serialization;

pub use reml_model::RemlModel;
pub use serialization::{load_model, model_summary, save_model, save_model_json};
