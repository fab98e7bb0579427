mod glyphs;

pub use glyphs::LabelFace;

use crate::config::RenderConfig;
use crate::detection::{Detection, DeviceResponse};
use crate::preprocess::Frame;
use ab_glyph::FontArc;
use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut},
    rect::Rect,
};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::instrument;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LANDMARK_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const STROKE_WIDTH: i32 = 2;
const LANDMARK_RADIUS: i32 = 3;
const LABEL_OFFSET: i32 = 10;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to decode frame: {0}")]
    Frame(#[source] image::ImageError),
    #[error("Failed to write annotated image {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to load font {path}: {reason}")]
    Font { path: PathBuf, reason: String },
}

#[derive(Debug, Clone)]
pub struct RenderedImage {
    pub image: RgbImage,
    pub saved_to: Option<PathBuf>,
}

#[derive(Clone)]
pub struct ResultRenderer {
    face: LabelFace,
    display: bool,
}

impl ResultRenderer {
    pub fn new(config: &RenderConfig) -> Result<Self, RenderError> {
        let face = match &config.font_path {
            Some(path) => {
                let bytes = std::fs::read(path)?;
                let font = FontArc::try_from_vec(bytes).map_err(|e| RenderError::Font {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
                LabelFace::Font(font)
            }
            None => LabelFace::Bitmap,
        };

        Ok(Self {
            face,
            display: config.display,
        })
    }

    /// Draws `response` onto a copy of `base`.
    pub fn annotate(&self, base: &RgbImage, response: &DeviceResponse) -> RgbImage {
        let mut canvas = base.clone();
        if let Some(result) = response.detections() {
            for detection in result.iter() {
                self.draw_detection(&mut canvas, detection);
            }
        }
        canvas
    }

    /// Decodes `frame`, annotates it and optionally writes it to
    /// `output_path` (parent directories are created) and shows it.
    #[instrument(skip(self, frame, response), fields(kind = response.kind()))]
    pub fn render(
        &self,
        frame: &Frame,
        response: &DeviceResponse,
        output_path: Option<&Path>,
    ) -> Result<RenderedImage, RenderError> {
        let base = frame.decode().map_err(RenderError::Frame)?;
        let image = self.annotate(&base, response);

        let saved_to = match output_path {
            Some(path) => {
                save(&image, path)?;
                tracing::info!("Annotated image saved to {}", path.display());
                Some(path.to_path_buf())
            }
            None => None,
        };

        if self.display {
            let preview = match &saved_to {
                Some(path) => path.clone(),
                None => {
                    let path = std::env::temp_dir().join("edge_probe_preview.jpg");
                    save(&image, &path)?;
                    path
                }
            };
            show(&preview)?;
        }

        Ok(RenderedImage { image, saved_to })
    }

    fn draw_detection(&self, canvas: &mut RgbImage, detection: &Detection) {
        let bbox = &detection.bbox;
        let (width, height) = (canvas.width() as i32, canvas.height() as i32);

        // Clamp far-away corners; the outline is clipped at the image edge anyway.
        let clamp_x = |v: i32| v.clamp(-STROKE_WIDTH, width + STROKE_WIDTH);
        let clamp_y = |v: i32| v.clamp(-STROKE_WIDTH, height + STROKE_WIDTH);
        let (left, right) = (clamp_x(bbox.x1.min(bbox.x2)), clamp_x(bbox.x1.max(bbox.x2)));
        let (top, bottom) = (clamp_y(bbox.y1.min(bbox.y2)), clamp_y(bbox.y1.max(bbox.y2)));

        for inset in 0..STROKE_WIDTH {
            let w = right - left + 1 - 2 * inset;
            let h = bottom - top + 1 - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(left + inset, top + inset).of_size(w as u32, h as u32);
            if w <= STROKE_WIDTH || h <= STROKE_WIDTH {
                draw_filled_rect_mut(canvas, rect, BOX_COLOR);
                break;
            }
            draw_hollow_rect_mut(canvas, rect, BOX_COLOR);
        }

        if let Some(score) = bbox.score {
            let label = format!("{:.2}", score);
            let y = top - (LABEL_OFFSET + self.face.height(&label));
            self.face.draw(canvas, left, y, &label, BOX_COLOR);
        }

        if let Some(landmarks) = &detection.landmarks {
            // Markers that cannot touch the canvas are skipped.
            let visible = |v: i32, dim: i32| (-LANDMARK_RADIUS..=dim + LANDMARK_RADIUS).contains(&v);
            for point in landmarks.points() {
                if visible(point.x, width) && visible(point.y, height) {
                    draw_filled_circle_mut(canvas, (point.x, point.y), LANDMARK_RADIUS, LANDMARK_COLOR);
                } else {
                    tracing::debug!("Landmark ({}, {}) is off the image", point.x, point.y);
                }
            }
        }
    }
}

fn save(image: &RgbImage, path: &Path) -> Result<(), RenderError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    image.save(path).map_err(|source| RenderError::Save {
        path: path.to_path_buf(),
        source,
    })
}

fn show(path: &Path) -> Result<(), RenderError> {
    let viewer = if cfg!(target_os = "macos") {
        "open"
    } else if cfg!(target_os = "windows") {
        "explorer"
    } else {
        "xdg-open"
    };
    // The viewer is left running on its own; nothing waits for it.
    let child = std::process::Command::new(viewer).arg(path).spawn()?;
    tracing::info!(
        "Opened {} with {} (pid {})",
        path.display(),
        viewer,
        child.id()
    );
    Ok(())
}
