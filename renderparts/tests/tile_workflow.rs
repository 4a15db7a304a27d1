use blender::models::border::Border;
use image::{Rgba, RgbaImage};
use renderparts_lib::{
    domains::renderer::{RenderDispatchError, RenderEvent, RenderListener, Renderer},
    models::{job_config::JobConfiguration, notification::Severity},
    routes::job,
    services::{image_reassembler::CanvasSize, render_scheduler::StopHandle},
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const WIDTH: u32 = 120;
const HEIGHT: u32 = 80;

/// Paints the requested region of a WIDTH x HEIGHT frame in a colour derived from its border.
struct PaintingRenderer {
    listener: Option<RenderListener>,
    border: Border,
    crop: bool,
    renders: usize,
    stop_after: Option<(usize, StopHandle)>,
}

impl PaintingRenderer {
    fn new() -> Self {
        Self {
            listener: None,
            border: Border::full(),
            crop: false,
            renders: 0,
            stop_after: None,
        }
    }

    fn stopping_after(renders: usize, stop: StopHandle) -> Self {
        Self {
            stop_after: Some((renders, stop)),
            ..Self::new()
        }
    }

    fn emit(&self, event: RenderEvent) {
        if let Some(listener) = &self.listener {
            listener.send(event).unwrap();
        }
    }

    fn paint(&self) -> RgbaImage {
        let x0 = (self.border.min_x() * WIDTH as f32).round() as u32;
        let x1 = (self.border.max_x() * WIDTH as f32).round() as u32;
        // image rows run top-down, the border bottom-up
        let y0 = ((1.0 - self.border.max_y()) * HEIGHT as f32).round() as u32;
        let y1 = ((1.0 - self.border.min_y()) * HEIGHT as f32).round() as u32;
        let colour = colour_of(self.border.min_x(), self.border.min_y());

        if self.crop {
            RgbaImage::from_pixel(x1 - x0, y1 - y0, colour)
        } else {
            RgbaImage::from_fn(WIDTH, HEIGHT, |x, y| {
                if (x0..x1).contains(&x) && (y0..y1).contains(&y) {
                    colour
                } else {
                    Rgba([0, 0, 0, 0])
                }
            })
        }
    }
}

fn colour_of(min_x: f32, min_y: f32) -> Rgba<u8> {
    Rgba([(min_x * 200.0) as u8, (min_y * 200.0) as u8, 90, 255])
}

#[async_trait::async_trait]
impl Renderer for PaintingRenderer {
    fn register(&mut self, listener: RenderListener) {
        self.listener = Some(listener);
    }

    fn deregister(&mut self) {
        self.listener = None;
    }

    fn set_region(&mut self, border: &Border, crop: bool) {
        self.border = border.clone();
        self.crop = crop;
    }

    async fn render(&mut self, output: &Path, _blocking: bool) -> Result<(), RenderDispatchError> {
        self.emit(RenderEvent::Pre);
        let path = PathBuf::from(format!("{}.png", output.display()));
        self.paint().save(&path).unwrap();
        self.renders += 1;
        if let Some((limit, stop)) = &self.stop_after {
            if self.renders >= *limit {
                stop.request();
            }
        }
        self.emit(RenderEvent::Post);
        self.emit(RenderEvent::Complete);
        Ok(())
    }
}

fn config(folder: &Path, parts_count: u32) -> JobConfiguration {
    JobConfiguration {
        output_folder: folder.to_path_buf(),
        parts_count,
        ..Default::default()
    }
}

// Every pixel of the merged frame carries the colour of the region that covers it.
fn assert_frame(path: &Path, parts_count: u32) {
    let merged = image::open(path).unwrap().to_rgba8();
    assert_eq!(merged.dimensions(), (WIDTH, HEIGHT));

    let n = parts_count as f32;
    let (part_width, part_height) = (WIDTH / parts_count, HEIGHT / parts_count);
    for (x, y, pixel) in merged.enumerate_pixels() {
        let band_x = (x / part_width) as f32;
        let band_y = (parts_count - 1 - y / part_height) as f32;
        assert_eq!(
            *pixel,
            colour_of(band_x / n, band_y / n),
            "pixel ({x}, {y})"
        );
    }
}

#[tokio::test]
async fn renders_and_merges_a_full_frame() {
    let temp_dir = TempDir::new().unwrap();
    let config = config(temp_dir.path(), 4);
    let mut renderer = PaintingRenderer::new();

    let notification = job::start(&config, &mut renderer, StopHandle::default()).await;
    assert_eq!(notification.severity, Severity::Info, "{notification}");
    assert_eq!(renderer.renders, 16);
    // region is put back once the job ends
    assert!(renderer.border.is_full());
    assert!(!renderer.crop);

    let (inventory, progress) = job::refresh(&config);
    assert!(inventory.is_complete());
    assert_eq!(progress.message, "Rendered parts: 16 / 16");

    let merged = job::merge(&config, None, false);
    assert_eq!(merged.severity, Severity::Info, "{merged}");
    assert_frame(&config.final_image_path(), 4);
}

#[tokio::test]
async fn interrupted_job_resumes_where_the_folder_says() {
    let temp_dir = TempDir::new().unwrap();
    let config = JobConfiguration {
        interactive_render: false,
        ..config(temp_dir.path(), 2)
    };

    let stop = StopHandle::default();
    let mut renderer = PaintingRenderer::stopping_after(1, stop.clone());
    let notification = job::start(&config, &mut renderer, stop).await;
    assert_eq!(notification.severity, Severity::Warning);
    assert_eq!(notification.message, "User interruption");
    assert_eq!(renderer.renders, 1);

    let (_, progress) = job::refresh(&config);
    assert_eq!(progress.message, "Rendered parts: 1 / 4");

    let early = job::merge(&config, None, false);
    assert!(early.is_error());
    assert!(early.message.contains("MissingTiles"));

    let mut renderer = PaintingRenderer::new();
    let notification = job::start(&config, &mut renderer, StopHandle::default()).await;
    assert_eq!(notification.severity, Severity::Info);
    assert_eq!(renderer.renders, 3);

    let merged = job::merge(&config, Some(CanvasSize::new(WIDTH, HEIGHT)), false);
    assert!(!merged.is_error(), "{merged}");
    assert_frame(&config.final_image_path(), 2);
}

#[tokio::test]
async fn uncropped_parts_merge_the_same_frame() {
    let temp_dir = TempDir::new().unwrap();
    let config = JobConfiguration {
        crop_to_border: false,
        ..config(temp_dir.path(), 2)
    };
    let mut renderer = PaintingRenderer::new();

    job::start(&config, &mut renderer, StopHandle::default()).await;
    let merged = job::merge(&config, None, false);
    assert!(!merged.is_error(), "{merged}");
    assert_frame(&config.final_image_path(), 2);
}
