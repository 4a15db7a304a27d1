pub mod job;
pub mod settings;
