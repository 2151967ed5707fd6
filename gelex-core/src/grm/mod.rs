//! Genomic relationship matrices.

pub mod dense;

pub use dense::{chromosome_groups, compute, compute_loco, ChromGroup, GrmConfig, GrmResult};
