use std::path::PathBuf;

/// Progress reported by a running blender process, parsed from its stdout.
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Running { status: String },
    Log { status: String },
    Warning { message: String },
    Error { message: String },
    /// Blender wrote the rendered image to disk.
    Completed { result: PathBuf },
    /// Process ended. `None` when it was terminated by a signal.
    Exit { code: Option<i32> },
}

impl Status {
    /// Parse one line of blender output. Returns `None` for lines not worth reporting.
    pub fn parse_line(line: &str) -> Option<Status> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if line.contains("Warning:") {
            Some(Status::Warning {
                message: line.to_owned(),
            })
        } else if line.starts_with("Error:") || line.starts_with("Traceback") {
            Some(Status::Error {
                message: line.to_owned(),
            })
        } else if line.contains("Fra:") {
            let last = line.split('|').last().unwrap_or(line).trim();
            let slice = last.split(' ').collect::<Vec<&str>>();
            match slice.as_slice() {
                ["Rendering", current, "/", total, ..] => {
                    let percentage = match (current.parse::<f32>(), total.parse::<f32>()) {
                        (Ok(current), Ok(total)) if total > 0.0 => current / total * 100.0,
                        _ => 0.0,
                    };
                    Some(Status::Running {
                        status: format!("{last} {percentage:.2}%"),
                    })
                }
                _ => Some(Status::Running {
                    status: last.to_owned(),
                }),
            }
        } else if line.contains("Saved:") {
            let location = line.split('\'').collect::<Vec<&str>>();
            location.get(1).map(|path| Status::Completed {
                result: PathBuf::from(path.trim()),
            })
        } else {
            Some(Status::Log {
                status: line.to_owned(),
            })
        }
    }
}
