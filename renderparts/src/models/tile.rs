use blender::models::{border::Border, format::Format};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One rectangular part of the final image.
///
/// `row` walks the horizontal axis and `column` the vertical axis measured from the bottom,
/// both 0-based. The name carries them 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileDescriptor {
    pub name: String,
    pub row: u32,
    pub column: u32,
    pub border: Border,
}

impl TileDescriptor {
    pub fn new(prefix: &str, row: u32, column: u32, parts_count: u32) -> Self {
        let n = parts_count as f32;
        let border = Border::new(
            row as f32 / n,
            (row + 1) as f32 / n,
            column as f32 / n,
            (column + 1) as f32 / n,
        );
        Self {
            name: tile_name(prefix, row, column, pad_width(parts_count)),
            row,
            column,
            border,
        }
    }

    /// File name of the rendered tile on disk.
    pub fn file_name(&self, format: &Format) -> String {
        format!("{}.{}", self.name, format.extension())
    }
}

/// A rendered image found in the output folder that belongs to the current job.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RenderInventoryEntry {
    /// File name including extension.
    pub image_name: String,
    pub row: u32,
    pub column: u32,
}

/// Digits used for the row and column indices: one less than the digit count of the total.
pub fn pad_width(parts_count: u32) -> usize {
    let total = u64::from(parts_count) * u64::from(parts_count);
    total.to_string().len().saturating_sub(1)
}

pub fn tile_name(prefix: &str, row: u32, column: u32, pad: usize) -> String {
    format!("{prefix}_{:0pad$}_{:0pad$}", row + 1, column + 1)
}

pub fn strip_extension(name: &str) -> &str {
    Path::new(name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(name)
}
