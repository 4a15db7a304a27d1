use super::{border::Border, engine::Engine, format::Format};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ref: https://docs.blender.org/manual/en/latest/advanced/command_line/render.html
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Args {
    file: PathBuf,              // required
    output: PathBuf,            // required - extension is appended by blender
    pub border: Border,         // defaults to the full frame
    pub crop: bool,             // crop the saved image to the border
    pub overwrite: bool,        // optional
    pub frame: Option<i32>,     // optional - current scene frame otherwise
    pub engine: Option<Engine>, // optional
    pub format: Option<Format>, // optional - default to scene setting
}

impl Args {
    pub fn new(file: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Args {
            file: file.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn create_arg_list(&self) -> Vec<String> {
        // More context: https://docs.blender.org/manual/en/latest/advanced/command_line/arguments.html#argument-order
        let mut col = vec!["-b".to_owned(), self.file.to_string_lossy().into_owned()];

        if let Some(engine) = &self.engine {
            col.push("-E".to_owned());
            col.push(engine.to_string());
        }

        // python errors would otherwise leave blender exiting with 0
        col.push("--python-exit-code".to_owned());
        col.push("1".to_owned());

        // this argument must be set at the very end, the script renders the still itself.
        col.push("--python-expr".to_owned());
        col.push(self.create_python_expr());
        col
    }

    // the border is not reachable through command line flags, so it goes through bpy instead.
    fn create_python_expr(&self) -> String {
        let mut script = vec![
            "import bpy".to_owned(),
            "scn = bpy.context.scene".to_owned(),
            "rndr = scn.render".to_owned(),
        ];

        if let Some(frame) = self.frame {
            script.push(format!("scn.frame_set({frame})"));
        }

        script.push(format!("rndr.border_min_x = {}", self.border.min_x()));
        script.push(format!("rndr.border_max_x = {}", self.border.max_x()));
        script.push(format!("rndr.border_min_y = {}", self.border.min_y()));
        script.push(format!("rndr.border_max_y = {}", self.border.max_y()));
        script.push(format!("rndr.use_border = {}", py_bool(!self.border.is_full())));
        script.push(format!("rndr.use_crop_to_border = {}", py_bool(self.crop)));
        script.push(format!("rndr.use_overwrite = {}", py_bool(self.overwrite)));

        if let Some(format) = &self.format {
            script.push(format!("rndr.image_settings.file_format = '{format}'"));
        }

        script.push("rndr.use_file_extension = True".to_owned());
        script.push(format!(
            "rndr.filepath = {}",
            py_str(&self.output.to_string_lossy())
        ));
        script.push("bpy.ops.render.render(write_still=True)".to_owned());
        script.join("\n")
    }
}

fn py_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

fn py_str(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}
