//! Performance categories and the distribution pie chart.

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_circle_mut, draw_text_mut};
use imageproc::rect::Rect;
use serde::Serialize;
use std::f64::consts::TAU;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::config::ChartConfig;
use crate::error::RenderError;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const INK: Rgb<u8> = Rgb([0, 0, 0]);
const TITLE: &str = "Student Performance Distribution";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PerformanceCategory {
    Good,
    Average,
    Low,
    Fail,
}

impl PerformanceCategory {
    pub const ALL: [PerformanceCategory; 4] = [
        PerformanceCategory::Good,
        PerformanceCategory::Average,
        PerformanceCategory::Low,
        PerformanceCategory::Fail,
    ];

    /// Good: > 40, Average: (30, 40], Low: (20, 30], Fail: <= 20
    pub fn from_mark(mark: f64) -> Self {
        if mark > 40.0 {
            PerformanceCategory::Good
        } else if mark > 30.0 {
            PerformanceCategory::Average
        } else if mark > 20.0 {
            PerformanceCategory::Low
        } else {
            PerformanceCategory::Fail
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PerformanceCategory::Good => "Good (>40)",
            PerformanceCategory::Average => "Average (>30)",
            PerformanceCategory::Low => "Low (>20)",
            PerformanceCategory::Fail => "Fail (<20)",
        }
    }

    pub fn color(&self) -> Rgb<u8> {
        match self {
            PerformanceCategory::Good => Rgb([0, 128, 0]),
            PerformanceCategory::Average => Rgb([255, 255, 0]),
            PerformanceCategory::Low => Rgb([255, 165, 0]),
            PerformanceCategory::Fail => Rgb([255, 0, 0]),
        }
    }

    pub fn css_color(&self) -> &'static str {
        match self {
            PerformanceCategory::Good => "green",
            PerformanceCategory::Average => "yellow",
            PerformanceCategory::Low => "orange",
            PerformanceCategory::Fail => "red",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub category: PerformanceCategory,
    pub label: &'static str,
    pub count: usize,
    pub percentage: f64,
}

/// Per-category counts for one batch, always all four categories in fixed order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCounts {
    pub total: usize,
    pub categories: Vec<CategoryCount>,
}

impl CategoryCounts {
    pub fn from_marks(marks: &[f64]) -> Self {
        let total = marks.len();
        let categories = PerformanceCategory::ALL
            .iter()
            .map(|&category| {
                let count = marks
                    .iter()
                    .filter(|&&m| PerformanceCategory::from_mark(m) == category)
                    .count();
                let percentage = if total > 0 {
                    count as f64 * 100.0 / total as f64
                } else {
                    0.0
                };
                CategoryCount { category, label: category.label(), count, percentage }
            })
            .collect();

        Self { total, categories }
    }

    pub fn count(&self, category: PerformanceCategory) -> usize {
        self.categories
            .iter()
            .find(|c| c.category == category)
            .map_or(0, |c| c.count)
    }
}

/// Result of one chart render
#[derive(Debug, Clone, Serialize)]
pub struct ChartSummary {
    pub path: PathBuf,
    pub counts: CategoryCounts,
}

/// Draws the category pie chart to one fixed PNG path.
///
/// Renders are serialized on an internal lock, and each one is written to a
/// sibling temporary file then renamed over the chart, so concurrent batches
/// never interleave writes and readers only ever see a complete PNG.
pub struct ChartRenderer {
    path: PathBuf,
    width: u32,
    height: u32,
    font: Option<FontVec>,
    write_lock: Mutex<()>,
}

impl ChartRenderer {
    pub fn new(path: impl Into<PathBuf>, config: &ChartConfig) -> Self {
        let font = config.font_path.as_deref().and_then(load_font);
        Self {
            path: path.into(),
            width: config.width.max(64),
            height: config.height.max(64),
            font,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bucket `marks` and overwrite the chart file with the resulting pie.
    pub fn render(&self, marks: &[f64]) -> Result<ChartSummary, RenderError> {
        let counts = CategoryCounts::from_marks(marks);
        let mut png = Cursor::new(Vec::new());
        self.draw(&counts).write_to(&mut png, image::ImageFormat::Png)?;

        let _guard = self.write_lock.lock().map_err(|_| RenderError::LockPoisoned)?;
        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                parent
            }
            None => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(png.get_ref())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        info!(path = %self.path.display(), total = counts.total, "performance chart written");
        Ok(ChartSummary { path: self.path.clone(), counts })
    }

    fn draw(&self, counts: &CategoryCounts) -> RgbImage {
        let (width, height) = (self.width, self.height);
        let legend_height = height / 5;
        let title_height = height / 12;
        let pie_area = (height - legend_height - title_height).min(width);
        let radius = pie_area as f64 * 0.45;
        let cx = width as f64 / 2.0;
        let cy = title_height as f64 + pie_area as f64 / 2.0;

        // Slice end angles, counter-clockwise from 3 o'clock.
        let mut bounds = Vec::with_capacity(counts.categories.len());
        let mut acc = 0.0;
        for c in &counts.categories {
            if counts.total > 0 {
                acc += c.count as f64 / counts.total as f64 * TAU;
            }
            bounds.push((acc, c.category.color()));
        }

        let mut canvas = RgbImage::from_fn(width, height, |x, y| {
            let dx = x as f64 + 0.5 - cx;
            let dy = cy - (y as f64 + 0.5);
            if counts.total == 0 || dx * dx + dy * dy > radius * radius {
                return BACKGROUND;
            }
            let angle = dy.atan2(dx).rem_euclid(TAU);
            bounds
                .iter()
                .find(|(end, _)| angle < *end)
                .or(bounds.last())
                .map_or(BACKGROUND, |(_, color)| *color)
        });

        draw_hollow_circle_mut(&mut canvas, (cx as i32, cy as i32), radius as i32, INK);

        let swatch = (legend_height.saturating_sub(20) / 4).max(4);
        let legend_top = title_height + pie_area;
        for (row, c) in counts.categories.iter().enumerate() {
            let y = legend_top as i32 + row as i32 * (swatch as i32 + 4) + 4;
            draw_filled_rect_mut(&mut canvas, Rect::at(16, y).of_size(swatch, swatch), c.category.color());

            if let Some(font) = &self.font {
                let text = format!("{}: {} ({:.1}%)", c.label, c.count, c.percentage);
                draw_text_mut(&mut canvas, INK, 24 + swatch as i32, y, PxScale::from(swatch as f32), font, &text);
            }
        }

        if let Some(font) = &self.font {
            let scale = PxScale::from(title_height as f32 * 0.6);
            draw_text_mut(&mut canvas, INK, 16, (title_height / 4) as i32, scale, font, TITLE);
        }

        canvas
    }
}

fn load_font(path: &Path) -> Option<FontVec> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "chart font unavailable, drawing without labels");
            return None;
        }
    };
    match FontVec::try_from_vec(bytes) {
        Ok(font) => Some(font),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "chart font invalid, drawing without labels");
            None
        }
    }
}
