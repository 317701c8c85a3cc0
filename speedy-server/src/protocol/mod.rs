pub mod commands;
pub mod envelope;

pub use envelope::{Request, Response};
