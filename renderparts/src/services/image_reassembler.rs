use crate::{
    models::{job_config::JobConfiguration, tile::TileDescriptor},
    services::{grid_partitioner::partition, tile_inventory::TileInventory},
};
use blender::models::format::Format;
use image::{DynamicImage, ImageError, ImageFormat, RgbaImage};
use std::{
    fs,
    io::{self, Cursor},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info, warn};

// RGBA
const CHANNELS: usize = 4;

#[derive(Debug, Error)]
pub enum ReassemblyError {
    #[error("No rendered parts found in {folder:?}")]
    NoTiles { folder: PathBuf },
    #[error("Missing parts: {}", .missing.join(", "))]
    MissingTiles { missing: Vec<String> },
    #[error("Merging into {0} images is not supported")]
    UnsupportedFormat(Format),
    #[error("Unable to read part {tile:?}: {source}")]
    Decode {
        tile: PathBuf,
        #[source]
        source: ImageError,
    },
    #[error("Part {tile:?} is {width}x{height}, expected {expected_width}x{expected_height} or the full frame")]
    MalformedTile {
        tile: PathBuf,
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },
    #[error("Invalid canvas size {width}x{height}")]
    InvalidCanvas { width: u32, height: u32 },
    #[error("Unable to encode the merged image: {0}")]
    Encode(#[from] ImageError),
    #[error("Unable to write the merged image: {0}")]
    Io(#[from] io::Error),
}

impl ReassemblyError {
    pub fn kind(&self) -> &'static str {
        match self {
            ReassemblyError::NoTiles { .. } => "NoTiles",
            ReassemblyError::MissingTiles { .. } => "MissingTiles",
            ReassemblyError::UnsupportedFormat(_) => "UnsupportedFormat",
            ReassemblyError::Decode { .. } => "Decode",
            ReassemblyError::MalformedTile { .. } => "MalformedTile",
            ReassemblyError::InvalidCanvas { .. } => "InvalidCanvas",
            ReassemblyError::Encode(_) => "Encode",
            ReassemblyError::Io(_) => "Io",
        }
    }
}

/// Pixel size of the full frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl CanvasSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Size of one cropped part, each side rounded to the nearest pixel.
    pub fn part_size(&self, parts_count: u32) -> (u32, u32) {
        let n = f64::from(parts_count.max(1));
        (
            (f64::from(self.width) / n).round() as u32,
            (f64::from(self.height) / n).round() as u32,
        )
    }

    /// Canvas implied by one rendered part. Cropped parts are 1/N of each side, uncropped ones
    /// are the full frame already.
    pub fn infer(tile_width: u32, tile_height: u32, parts_count: u32, cropped: bool) -> Self {
        if cropped {
            Self::new(tile_width * parts_count, tile_height * parts_count)
        } else {
            Self::new(tile_width, tile_height)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Grid coordinates `(row, column)` in paste order. Rows run along x and columns up from the
/// bottom, while the canvas is filled top-down: column from last to first, row from first to last.
pub fn merge_order(parts_count: u32) -> Vec<(u32, u32)> {
    (0..parts_count)
        .rev()
        .flat_map(|column| (0..parts_count).map(move |row| (row, column)))
        .collect()
}

pub fn image_format(format: &Format) -> Result<ImageFormat, ReassemblyError> {
    match format {
        Format::TGA | Format::RAWTGA => Ok(ImageFormat::Tga),
        Format::JPEG => Ok(ImageFormat::Jpeg),
        Format::PNG => Ok(ImageFormat::Png),
        Format::BMP => Ok(ImageFormat::Bmp),
        Format::TIFF => Ok(ImageFormat::Tiff),
        Format::IRIS | Format::HDR => Err(ReassemblyError::UnsupportedFormat(format.clone())),
    }
}

/// Paste every part of `inventory` onto a transparent canvas.
pub fn compose(
    config: &JobConfiguration,
    inventory: &TileInventory,
    canvas: CanvasSize,
) -> Result<RgbaImage, ReassemblyError> {
    if canvas.is_empty() {
        return Err(ReassemblyError::InvalidCanvas {
            width: canvas.width,
            height: canvas.height,
        });
    }

    let n = config.parts_count;
    let (part_width, part_height) = canvas.part_size(n);
    let extension = config.format.extension();
    let mut output = RgbaImage::new(canvas.width, canvas.height);

    for (k, (row, column)) in merge_order(n).into_iter().enumerate() {
        let k = k as u32;
        let Some(entry) = inventory.find(row, column, extension) else {
            let tile = TileDescriptor::new(&config.filename_prefix, row, column, n);
            return Err(ReassemblyError::MissingTiles {
                missing: vec![tile.name],
            });
        };
        let path = config.output_folder.join(&entry.image_name);
        let tile = image::open(&path)
            .map_err(|source| ReassemblyError::Decode {
                tile: path.clone(),
                source,
            })?
            .to_rgba8();

        let destination = ((k % n) * part_width, (k / n) * part_height);
        // full frame first, on tiny frames it is also within a pixel of the part size
        let source = if tile.dimensions() == (canvas.width, canvas.height) {
            // rendered without crop, the part sits in place inside the full frame
            destination
        } else if tile.width().abs_diff(part_width) <= 1
            && tile.height().abs_diff(part_height) <= 1
        {
            (0, 0)
        } else {
            return Err(ReassemblyError::MalformedTile {
                tile: path,
                width: tile.width(),
                height: tile.height(),
                expected_width: part_width,
                expected_height: part_height,
            });
        };

        let width = part_width
            .min(tile.width().saturating_sub(source.0))
            .min(canvas.width.saturating_sub(destination.0));
        let height = part_height
            .min(tile.height().saturating_sub(source.1))
            .min(canvas.height.saturating_sub(destination.1));

        debug!(
            tile = %entry.image_name,
            x = destination.0,
            y = destination.1,
            width,
            height,
            "Pasting part"
        );
        copy_region(&tile, source, &mut output, destination, (width, height));
    }

    Ok(output)
}

// Row by row copy of a `size` block, both buffers tightly packed RGBA.
fn copy_region(
    src: &RgbaImage,
    (sx, sy): (u32, u32),
    dst: &mut RgbaImage,
    (dx, dy): (u32, u32),
    (width, height): (u32, u32),
) {
    let src_stride = src.width() as usize * CHANNELS;
    let dst_stride = dst.width() as usize * CHANNELS;
    let row_len = width as usize * CHANNELS;
    let src_raw = src.as_raw();
    let dst_raw: &mut [u8] = &mut **dst;

    for y in 0..height as usize {
        let s = (sy as usize + y) * src_stride + sx as usize * CHANNELS;
        let d = (dy as usize + y) * dst_stride + dx as usize * CHANNELS;
        dst_raw[d..d + row_len].copy_from_slice(&src_raw[s..s + row_len]);
    }
}

/// Merge every rendered part into `FINAL_{prefix}.{ext}` inside the output folder.
///
/// Without a `canvas` the frame size is inferred from the first part. Nothing is written unless
/// the whole image encodes.
pub fn merge(
    config: &JobConfiguration,
    canvas: Option<CanvasSize>,
) -> Result<PathBuf, ReassemblyError> {
    let format = image_format(&config.format)?;
    let inventory = TileInventory::refresh(config);
    if inventory.is_empty() {
        return Err(ReassemblyError::NoTiles {
            folder: config.output_folder.clone(),
        });
    }

    let missing = partition(config, inventory.rendered_names())
        .into_iter()
        .map(|tile| tile.name)
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(ReassemblyError::MissingTiles { missing });
    }

    let canvas = match canvas {
        Some(canvas) => canvas,
        None => infer_canvas(config, &inventory)?,
    };
    let n = config.parts_count;
    if canvas.width % n != 0 || canvas.height % n != 0 {
        warn!(
            width = canvas.width,
            height = canvas.height,
            parts = n,
            "Frame size is not a multiple of the parts count, the last band will be off by a few pixels"
        );
    }

    info!(
        width = canvas.width,
        height = canvas.height,
        parts = inventory.rendered_count(),
        "Merging parts"
    );
    let image = compose(config, &inventory, canvas)?;
    let bytes = encode(image, format)?;

    let path = config.final_image_path();
    write_atomically(&path, &bytes)?;
    info!(?path, "Merged image saved");
    Ok(path)
}

fn infer_canvas(
    config: &JobConfiguration,
    inventory: &TileInventory,
) -> Result<CanvasSize, ReassemblyError> {
    let first = inventory
        .find(0, 0, config.format.extension())
        .or_else(|| inventory.entries().first())
        .ok_or_else(|| ReassemblyError::NoTiles {
            folder: config.output_folder.clone(),
        })?;
    let path = config.output_folder.join(&first.image_name);
    let (width, height) =
        image::image_dimensions(&path).map_err(|source| ReassemblyError::Decode {
            tile: path.clone(),
            source,
        })?;
    let canvas = CanvasSize::infer(width, height, config.parts_count, config.crop_to_border);
    debug!(?canvas, tile = ?path, "Frame size inferred");
    Ok(canvas)
}

fn encode(image: RgbaImage, format: ImageFormat) -> Result<Vec<u8>, ReassemblyError> {
    let mut bytes = Cursor::new(Vec::new());
    match format {
        // no alpha channel in jpeg
        ImageFormat::Jpeg => DynamicImage::ImageRgba8(image)
            .to_rgb8()
            .write_to(&mut bytes, format)?,
        _ => image.write_to(&mut bytes, format)?,
    }
    Ok(bytes.into_inner())
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), ReassemblyError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{file_name}.part"));
    fs::write(&temp, bytes)?;
    if let Err(e) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use tempfile::TempDir;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
    const YELLOW: Rgba<u8> = Rgba([255, 255, 0, 255]);

    fn config(folder: &Path, parts_count: u32) -> JobConfiguration {
        JobConfiguration {
            output_folder: folder.to_path_buf(),
            parts_count,
            ..Default::default()
        }
    }

    fn solid(folder: &Path, name: &str, width: u32, height: u32, colour: Rgba<u8>) {
        RgbaImage::from_pixel(width, height, colour)
            .save(folder.join(name))
            .unwrap();
    }

    fn quadrants(folder: &Path) {
        solid(folder, "Fart_1_1.png", 50, 50, RED);
        solid(folder, "Fart_1_2.png", 50, 50, GREEN);
        solid(folder, "Fart_2_1.png", 50, 50, BLUE);
        solid(folder, "Fart_2_2.png", 50, 50, YELLOW);
    }

    fn assert_nothing_written(config: &JobConfiguration) {
        assert!(!config.final_image_path().exists());
        let leftovers = fs::read_dir(&config.output_folder)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn merge_order_walks_columns_from_the_top() {
        assert_eq!(merge_order(1), vec![(0, 0)]);
        assert_eq!(merge_order(2), vec![(0, 1), (1, 1), (0, 0), (1, 0)]);
        let order = merge_order(3);
        assert_eq!(order.first(), Some(&(0, 2)));
        assert_eq!(order[3], (0, 1));
        assert_eq!(order.last(), Some(&(2, 0)));
    }

    #[test]
    fn part_size_rounds_to_nearest_pixel() {
        assert_eq!(CanvasSize::new(400, 400).part_size(4), (100, 100));
        assert_eq!(CanvasSize::new(1920, 1080).part_size(4), (480, 270));
        assert_eq!(CanvasSize::new(1000, 1000).part_size(3), (333, 333));
        assert_eq!(CanvasSize::new(1001, 500).part_size(3), (334, 167));
        assert_eq!(CanvasSize::infer(100, 50, 4, true), CanvasSize::new(400, 200));
        assert_eq!(CanvasSize::infer(400, 200, 4, false), CanvasSize::new(400, 200));
    }

    #[test]
    fn formats_without_an_encoder_are_refused() {
        assert_eq!(image_format(&Format::PNG).unwrap(), ImageFormat::Png);
        assert_eq!(image_format(&Format::RAWTGA).unwrap(), ImageFormat::Tga);
        assert!(matches!(
            image_format(&Format::HDR),
            Err(ReassemblyError::UnsupportedFormat(Format::HDR))
        ));
        assert!(image_format(&Format::IRIS).is_err());
    }

    #[test]
    fn each_colour_lands_in_its_quadrant() {
        let temp_dir = TempDir::new().unwrap();
        quadrants(temp_dir.path());
        let config = config(temp_dir.path(), 2);

        let path = merge(&config, Some(CanvasSize::new(100, 100))).unwrap();
        assert_eq!(path, temp_dir.path().join("FINAL_Fart.png"));

        let merged = image::open(&path).unwrap().to_rgba8();
        assert_eq!(merged.dimensions(), (100, 100));
        assert_eq!(*merged.get_pixel(25, 75), RED); // bottom left
        assert_eq!(*merged.get_pixel(25, 25), GREEN); // top left
        assert_eq!(*merged.get_pixel(75, 75), BLUE); // bottom right
        assert_eq!(*merged.get_pixel(75, 25), YELLOW); // top right
        assert_eq!(*merged.get_pixel(0, 0), GREEN);
        assert_eq!(*merged.get_pixel(99, 99), BLUE);
    }

    #[test]
    fn sixteen_parts_merge_into_the_inferred_frame() {
        let temp_dir = TempDir::new().unwrap();
        let folder = temp_dir.path();
        let colour = |row: u32, column: u32| Rgba([row as u8 * 60, column as u8 * 60, 7, 255]);
        for row in 0..4 {
            for column in 0..4 {
                let name = format!("Fart_{}_{}.png", row + 1, column + 1);
                solid(folder, &name, 100, 100, colour(row, column));
            }
        }

        let config = config(folder, 4);
        let path = merge(&config, None).unwrap();
        let merged = image::open(path).unwrap().to_rgba8();
        assert_eq!(merged.dimensions(), (400, 400));

        for row in 0..4 {
            for column in 0..4 {
                let x = row * 100 + 50;
                let y = (3 - column) * 100 + 50;
                assert_eq!(*merged.get_pixel(x, y), colour(row, column), "tile {row} {column}");
            }
        }
    }

    #[test]
    fn uncropped_parts_contribute_their_own_region() {
        let temp_dir = TempDir::new().unwrap();
        let folder = temp_dir.path();
        let paint = |name: &str, x0: u32, y0: u32, colour: Rgba<u8>| {
            let tile = RgbaImage::from_fn(100, 100, |x, y| {
                if (x0..x0 + 50).contains(&x) && (y0..y0 + 50).contains(&y) {
                    colour
                } else {
                    Rgba([0, 0, 0, 0])
                }
            });
            tile.save(folder.join(name)).unwrap();
        };
        paint("Fart_1_1.png", 0, 50, RED);
        paint("Fart_1_2.png", 0, 0, GREEN);
        paint("Fart_2_1.png", 50, 50, BLUE);
        paint("Fart_2_2.png", 50, 0, YELLOW);

        let config = JobConfiguration {
            crop_to_border: false,
            ..config(folder, 2)
        };
        let merged = image::open(merge(&config, None).unwrap()).unwrap().to_rgba8();
        assert_eq!(merged.dimensions(), (100, 100));
        assert_eq!(*merged.get_pixel(10, 90), RED);
        assert_eq!(*merged.get_pixel(10, 10), GREEN);
        assert_eq!(*merged.get_pixel(90, 90), BLUE);
        assert_eq!(*merged.get_pixel(90, 10), YELLOW);
    }

    #[test]
    fn tiny_uncropped_frame_keeps_each_region() {
        let temp_dir = TempDir::new().unwrap();
        let folder = temp_dir.path();
        // 3x3 frame, parts are 2x2 and clipped at the right and bottom edges
        let paint = |name: &str, x0: u32, y0: u32, colour: Rgba<u8>| {
            let tile = RgbaImage::from_fn(3, 3, |x, y| {
                if (x0..x0 + 2).contains(&x) && (y0..y0 + 2).contains(&y) {
                    colour
                } else {
                    Rgba([0, 0, 0, 0])
                }
            });
            tile.save(folder.join(name)).unwrap();
        };
        paint("Fart_1_1.png", 0, 2, RED);
        paint("Fart_1_2.png", 0, 0, GREEN);
        paint("Fart_2_1.png", 2, 2, BLUE);
        paint("Fart_2_2.png", 2, 0, YELLOW);

        let config = JobConfiguration {
            crop_to_border: false,
            ..config(folder, 2)
        };
        let merged = image::open(merge(&config, None).unwrap()).unwrap().to_rgba8();
        assert_eq!(merged.dimensions(), (3, 3));
        assert_eq!(*merged.get_pixel(0, 0), GREEN);
        assert_eq!(*merged.get_pixel(2, 0), YELLOW);
        assert_eq!(*merged.get_pixel(0, 2), RED);
        assert_eq!(*merged.get_pixel(2, 2), BLUE);
    }

    #[test]
    fn parts_one_pixel_off_are_clipped() {
        let temp_dir = TempDir::new().unwrap();
        let folder = temp_dir.path();
        solid(folder, "Fart_1_1.png", 51, 50, RED);
        solid(folder, "Fart_1_2.png", 51, 51, GREEN);
        solid(folder, "Fart_2_1.png", 50, 49, BLUE);
        solid(folder, "Fart_2_2.png", 50, 50, YELLOW);

        let config = config(folder, 2);
        let merged = image::open(merge(&config, Some(CanvasSize::new(100, 100))).unwrap())
            .unwrap()
            .to_rgba8();
        assert_eq!(*merged.get_pixel(49, 99), RED);
        assert_eq!(*merged.get_pixel(50, 0), YELLOW);
        assert_eq!(*merged.get_pixel(75, 99), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn jpeg_output_drops_alpha() {
        let temp_dir = TempDir::new().unwrap();
        let folder = temp_dir.path();
        for name in ["Fart_1_1.jpg", "Fart_1_2.jpg", "Fart_2_1.jpg", "Fart_2_2.jpg"] {
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(50, 50, BLUE))
                .to_rgb8()
                .save(folder.join(name))
                .unwrap();
        }

        let config = JobConfiguration {
            format: Format::JPEG,
            ..config(folder, 2)
        };
        let path = merge(&config, None).unwrap();
        assert_eq!(path, folder.join("FINAL_Fart.jpg"));
        let merged = image::open(path).unwrap();
        assert_eq!(merged.color(), image::ColorType::Rgb8);
        assert_eq!((merged.width(), merged.height()), (100, 100));
    }

    #[test]
    fn empty_folder_is_no_tiles() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(temp_dir.path(), 2);
        let err = merge(&config, None).unwrap_err();
        assert!(matches!(err, ReassemblyError::NoTiles { .. }));
        assert_eq!(err.kind(), "NoTiles");
        assert_nothing_written(&config);
    }

    #[test]
    fn missing_part_is_named() {
        let temp_dir = TempDir::new().unwrap();
        let folder = temp_dir.path();
        solid(folder, "Fart_1_1.png", 50, 50, RED);
        solid(folder, "Fart_2_2.png", 50, 50, RED);

        let config = config(folder, 2);
        match merge(&config, None) {
            Err(ReassemblyError::MissingTiles { missing }) => {
                assert_eq!(missing, vec!["Fart_1_2", "Fart_2_1"])
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert_nothing_written(&config);
    }

    #[test]
    fn wrong_sized_part_is_malformed() {
        let temp_dir = TempDir::new().unwrap();
        let folder = temp_dir.path();
        quadrants(folder);
        solid(folder, "Fart_2_1.png", 30, 30, BLUE);

        let config = config(folder, 2);
        let err = merge(&config, Some(CanvasSize::new(100, 100))).unwrap_err();
        assert!(matches!(
            err,
            ReassemblyError::MalformedTile {
                width: 30,
                height: 30,
                expected_width: 50,
                expected_height: 50,
                ..
            }
        ));
        assert_nothing_written(&config);
    }

    #[test]
    fn placeholder_left_behind_fails_to_decode() {
        let temp_dir = TempDir::new().unwrap();
        let folder = temp_dir.path();
        quadrants(folder);
        fs::write(folder.join("Fart_1_2.png"), b"").unwrap();

        let config = config(folder, 2);
        let err = merge(&config, Some(CanvasSize::new(100, 100))).unwrap_err();
        match &err {
            ReassemblyError::Decode { tile, .. } => assert!(tile.ends_with("Fart_1_2.png")),
            other => panic!("unexpected error {other:?}"),
        }
        assert_nothing_written(&config);
    }

    #[test]
    fn unsupported_format_is_refused_before_reading() {
        let temp_dir = TempDir::new().unwrap();
        let config = JobConfiguration {
            format: Format::HDR,
            ..config(temp_dir.path(), 2)
        };
        let err = merge(&config, None).unwrap_err();
        assert_eq!(err.kind(), "UnsupportedFormat");
        assert_nothing_written(&config);
    }

    #[test]
    fn zero_canvas_is_invalid() {
        let temp_dir = TempDir::new().unwrap();
        quadrants(temp_dir.path());
        let config = config(temp_dir.path(), 2);
        assert!(matches!(
            merge(&config, Some(CanvasSize::new(0, 100))),
            Err(ReassemblyError::InvalidCanvas { .. })
        ));
        assert_nothing_written(&config);
    }

    #[test]
    fn merged_output_is_not_counted_as_a_part() {
        let temp_dir = TempDir::new().unwrap();
        quadrants(temp_dir.path());
        let config = config(temp_dir.path(), 2);
        merge(&config, None).unwrap();

        let inventory = TileInventory::refresh(&config);
        assert_eq!(inventory.entries().len(), 4);
        // merging twice replaces the previous output
        merge(&config, None).unwrap();
    }
}
