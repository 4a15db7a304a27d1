use super::tile::TileDescriptor;
use blender::models::format::Format;
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

// path to config file name.
const SETTINGS_PATH: &str = "RenderParts/";
const SETTINGS_FILE_NAME: &str = "JobConfiguration.json";
const FINAL_PREFIX: &str = "FINAL_";

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Parts count must be at least 1, got {0}")]
    InvalidPartsCount(u32),
    #[error("Filename prefix must not be empty")]
    EmptyPrefix,
    #[error("Filename prefix must be a plain file name: {0:?}")]
    InvalidPrefix(String),
    #[error("Output folder {path:?} is not writable: {reason}")]
    FolderNotWritable { path: PathBuf, reason: String },
    #[error("Unable to locate the user config directory")]
    NoConfigDir,
    #[error("Unable to access configuration file {path:?}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Unable to parse configuration file {path:?}: {source}")]
    InvalidFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything a render job needs to know about where and how its parts are stored.
/// Tiles are matched by file name only, so changing `parts_count` mid job starts a new tile set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfiguration {
    pub output_folder: PathBuf,
    pub filename_prefix: String,
    /// Side length N of the N x N grid.
    pub parts_count: u32,
    pub crop_to_border: bool,
    /// Handed to the renderer, the scheduler itself never overwrites a rendered part.
    pub overwrite_existing: bool,
    /// Interactive renders return immediately and skip the placeholder reservation.
    pub interactive_render: bool,
    pub format: Format,
}

impl Default for JobConfiguration {
    fn default() -> Self {
        Self {
            output_folder: PathBuf::from("."),
            filename_prefix: "Fart".to_owned(),
            parts_count: 4,
            crop_to_border: true,
            overwrite_existing: false,
            interactive_render: true,
            format: Format::PNG,
        }
    }
}

impl JobConfiguration {
    pub fn total_tiles(&self) -> u64 {
        u64::from(self.parts_count) * u64::from(self.parts_count)
    }

    /// Path handed to the renderer for this tile, blender appends the extension.
    pub fn tile_output(&self, tile: &TileDescriptor) -> PathBuf {
        self.output_folder.join(&tile.name)
    }

    /// Path of the rendered tile once it exists on disk.
    pub fn tile_path(&self, tile: &TileDescriptor) -> PathBuf {
        self.output_folder.join(tile.file_name(&self.format))
    }

    pub fn final_image_name(&self) -> String {
        format!(
            "{FINAL_PREFIX}{}.{}",
            self.filename_prefix,
            self.format.extension()
        )
    }

    pub fn final_image_path(&self) -> PathBuf {
        self.output_folder.join(self.final_image_name())
    }

    /// Check the configuration before any work starts. Creates the output folder if missing.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.parts_count < 1 {
            return Err(ConfigurationError::InvalidPartsCount(self.parts_count));
        }

        let prefix = self.filename_prefix.trim();
        if prefix.is_empty() {
            return Err(ConfigurationError::EmptyPrefix);
        }
        // the prefix is used verbatim, surrounding blanks would end up in every file name
        if prefix != self.filename_prefix
            || prefix.contains(['/', '\\'])
            || prefix == "."
            || prefix == ".."
        {
            return Err(ConfigurationError::InvalidPrefix(
                self.filename_prefix.clone(),
            ));
        }

        let not_writable = |reason: String| ConfigurationError::FolderNotWritable {
            path: self.output_folder.clone(),
            reason,
        };
        fs::create_dir_all(&self.output_folder).map_err(|e| not_writable(e.to_string()))?;
        let metadata = fs::metadata(&self.output_folder).map_err(|e| not_writable(e.to_string()))?;
        if !metadata.is_dir() {
            return Err(not_writable("not a directory".to_owned()));
        }
        if metadata.permissions().readonly() {
            return Err(not_writable("read only".to_owned()));
        }
        Ok(())
    }

    /// Default location: `<config dir>/RenderParts/JobConfiguration.json`.
    pub fn get_config_path() -> Result<PathBuf, ConfigurationError> {
        let path = dirs::config_dir().ok_or(ConfigurationError::NoConfigDir)?;
        Ok(path.join(SETTINGS_PATH).join(SETTINGS_FILE_NAME))
    }

    /// Load user configurations from the user's config directory.
    pub fn load() -> Result<Self, ConfigurationError> {
        Self::load_from(Self::get_config_path()?)
    }

    /// Load from a json file. A missing file yields the defaults.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(data) => serde_json::from_str(&data).map_err(|source| {
                ConfigurationError::InvalidFile {
                    path: path.to_path_buf(),
                    source,
                }
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(?path, "No configuration file found, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigurationError::Unreadable {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Save the configurations to the user's config directory.
    pub fn save(&self) -> Result<PathBuf, ConfigurationError> {
        let path = Self::get_config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigurationError> {
        let path = path.as_ref();
        let unwritable = |source| ConfigurationError::Unreadable {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(unwritable)?;
        }
        let data = serde_json::to_string_pretty(self).map_err(|source| {
            ConfigurationError::InvalidFile {
                path: path.to_path_buf(),
                source,
            }
        })?;
        fs::write(path, data).map_err(unwritable)
    }
}
