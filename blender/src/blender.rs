use crate::models::{args::Args, status::Status};
use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    process::Stdio,
};
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
    sync::mpsc::{self, UnboundedReceiver},
};

#[derive(Debug, Error)]
pub enum BlenderError {
    #[error("Unable to launch blender at {path:?}: {source}")]
    ExecutableNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to read blender version from: {0:?}")]
    UnknownVersion(String),
    #[error("Unable to capture blender output! Program closed pipe?")]
    BrokenPipe,
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

/// Blender structure to hold path to executable and version of blender installed.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct Blender {
    /// Path to blender executable on the system.
    pub executable: PathBuf,
    /// Version of blender installed on the system.
    pub version: Version,
}

impl Blender {
    /// Create a new blender struct with provided path and version. Note this is not checked and enforced!
    ///
    /// # Examples
    /// ```
    /// use blender::blender::Blender;
    /// use semver::Version;
    /// let blender = Blender::new("path/to/blender", Version::new(4, 1, 0));
    /// assert_eq!(blender.version, Version::new(4, 1, 0));
    /// ```
    pub fn new(executable: impl AsRef<Path>, version: Version) -> Self {
        Blender {
            executable: executable.as_ref().to_path_buf(),
            version,
        }
    }

    /// Create a new blender struct from executable path. This function will fetch the version of blender by invoking -v command.
    /// Otherwise, if Blender is not install, or a version is not found, an error will be returned.
    pub async fn from_executable(executable: impl AsRef<Path>) -> Result<Self, BlenderError> {
        let executable = executable.as_ref().to_path_buf();
        let output = Command::new(&executable)
            .arg("-v")
            .output()
            .await
            .map_err(|source| BlenderError::ExecutableNotFound {
                path: executable.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let version = Self::parse_version(&stdout).ok_or_else(|| {
            BlenderError::UnknownVersion(stdout.lines().next().unwrap_or_default().to_owned())
        })?;

        Ok(Blender {
            executable,
            version,
        })
    }

    // first line reads like "Blender 4.1.0" or "Blender 2.80 (sub 75)"
    fn parse_version(stdout: &str) -> Option<Version> {
        let re = Regex::new(r"Blender (\d+)\.(\d+)(?:\.(\d+))?").ok()?;
        let caps = re.captures(stdout)?;
        let major = caps[1].parse().ok()?;
        let minor = caps[2].parse().ok()?;
        let patch = match caps.get(3) {
            Some(patch) => patch.as_str().parse().ok()?,
            None => 0,
        };
        Some(Version::new(major, minor, patch))
    }

    /// Spawn blender in background mode and stream its progress.
    /// The receiver yields parsed stdout lines and always ends with [`Status::Exit`].
    pub async fn render(&self, args: &Args) -> Result<UnboundedReceiver<Status>, BlenderError> {
        let col = args.create_arg_list();
        tracing::debug!(executable = ?self.executable, output = ?args.output(), "Spawning blender");

        let mut command = Command::new(&self.executable);
        command
            .args(col)
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        // keep ctrl-c on the terminal away from blender, a render in flight is never aborted.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn()?;
        let stdout = child.stdout.take().ok_or(BlenderError::BrokenPipe)?;
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(status) = Status::parse_line(&line) {
                    let _ = tx.send(status);
                }
            }

            let code = match child.wait().await {
                Ok(exit) => exit.code(),
                Err(e) => {
                    let _ = tx.send(Status::Error {
                        message: e.to_string(),
                    });
                    None
                }
            };
            let _ = tx.send(Status::Exit { code });
        });

        Ok(rx)
    }
}

impl PartialEq for Blender {
    fn eq(&self, other: &Self) -> bool {
        self.version.eq(&other.version)
    }
}
