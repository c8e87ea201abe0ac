pub mod artifact;
pub mod task;
