use crate::models::{
    job_config::JobConfiguration,
    tile::{pad_width, strip_extension, tile_name, RenderInventoryEntry},
};
use regex::Regex;
use serde::Serialize;
use std::{
    collections::{BTreeSet, HashSet},
    fs,
    path::Path,
};

/// Extensions counted as rendered images.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tiff", "tif", "bmp", "gif", "tga"];

/// Image file names directly inside `folder`. A missing or unreadable folder is simply empty.
pub fn scan(folder: &Path, extensions: &[&str]) -> BTreeSet<String> {
    let entries = match fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(?folder, "Unable to read render folder, treating as empty: {e}");
            return BTreeSet::new();
        }
    };

    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| has_extension(name, extensions))
        .collect()
}

fn has_extension(name: &str, extensions: &[&str]) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

pub fn expected_count(config: &JobConfiguration) -> u64 {
    config.total_tiles()
}

pub fn is_complete(folder: &Path, config: &JobConfiguration) -> bool {
    TileInventory::scan_folder(folder, config).is_complete()
}

/// Tiles of the current job found on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TileInventory {
    entries: Vec<RenderInventoryEntry>,
    total: u64,
}

impl TileInventory {
    /// Scan the configured output folder.
    pub fn refresh(config: &JobConfiguration) -> Self {
        Self::scan_folder(&config.output_folder, config)
    }

    /// Keep only names of the form `{prefix}_{row}_{column}` that belong to this grid,
    /// padding included, so other jobs and the merged image never count.
    pub fn scan_folder(folder: &Path, config: &JobConfiguration) -> Self {
        let total = expected_count(config);
        let pattern = format!(r"^{}_(\d+)_(\d+)$", regex::escape(&config.filename_prefix));
        let re = match Regex::new(&pattern) {
            Ok(re) => re,
            Err(e) => {
                tracing::warn!("Unable to build tile name pattern: {e}");
                return Self {
                    entries: Vec::new(),
                    total,
                };
            }
        };

        let n = config.parts_count;
        let pad = pad_width(n);
        let entries = scan(folder, IMAGE_EXTENSIONS)
            .into_iter()
            .filter_map(|image_name| {
                let stem = strip_extension(&image_name);
                let (row, column) = {
                    let caps = re.captures(stem)?;
                    let row = caps[1].parse::<u32>().ok()?.checked_sub(1)?;
                    let column = caps[2].parse::<u32>().ok()?.checked_sub(1)?;
                    (row, column)
                };
                let belongs = row < n
                    && column < n
                    && tile_name(&config.filename_prefix, row, column, pad) == stem;
                belongs.then(|| RenderInventoryEntry {
                    image_name,
                    row,
                    column,
                })
            })
            .collect::<Vec<_>>();

        tracing::debug!(?folder, found = entries.len(), total, "Scanned render folder");
        Self { entries, total }
    }

    pub fn entries(&self) -> &[RenderInventoryEntry] {
        &self.entries
    }

    /// File names, extension included.
    pub fn rendered_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.image_name.as_str())
    }

    /// Distinct tiles on disk, a tile saved under two extensions counts once.
    pub fn rendered_count(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| (e.row, e.column))
            .collect::<HashSet<_>>()
            .len() as u64
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.rendered_count() == self.total
    }

    /// File holding the tile at (`row`, `column`), preferring `extension` when saved twice.
    pub fn find(&self, row: u32, column: u32, extension: &str) -> Option<&RenderInventoryEntry> {
        let mut candidates = self
            .entries
            .iter()
            .filter(|e| e.row == row && e.column == column);
        let first = candidates.next()?;
        if has_extension(&first.image_name, &[extension]) {
            return Some(first);
        }
        candidates
            .find(|e| has_extension(&e.image_name, &[extension]))
            .or(Some(first))
    }
}
