// this is the settings controller section, it shows and persists the job configuration.
use crate::models::{job_config::JobConfiguration, notification::Notification};
use std::path::Path;
use tracing::{error, info};

const SETTINGS: &str = "Settings";

/// Effective configuration as pretty json.
pub fn show_config(config: &JobConfiguration) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(config)
}

/// Persist `config` to `path`, or to the user's config directory when none is given.
pub fn save_config(config: &JobConfiguration, path: Option<&Path>) -> Notification {
    let result = match path {
        Some(path) => config.save_to(path).map(|_| path.to_path_buf()),
        None => config.save(),
    };

    match result {
        Ok(path) => {
            info!(?path, "Configuration saved");
            Notification::info(SETTINGS, format!("Saved to {}", path.display()))
        }
        Err(e) => {
            error!("Unable to save configuration: {e}");
            Notification::error(SETTINGS, e.to_string())
        }
    }
}
