//! Variance-component estimation for the null mixed model.

pub mod ai_reml;
pub mod loco;

pub use ai_reml::{fit, RemlConfig, RemlFit};
pub use loco::LocoSet;
