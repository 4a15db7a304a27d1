pub mod args;
pub mod border;
pub mod engine;
pub mod format;
pub mod status;
