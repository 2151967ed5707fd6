pub mod assoc;
pub mod fit;
pub mod grm;
pub mod predict;
