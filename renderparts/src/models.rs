pub mod job_config;
pub mod notification;
pub mod scheduler_state;
pub mod tile;
