use serde::Serialize;

use crate::models::job::PayloadShape;
use crate::services::layouts::LayoutCatalog;
use crate::services::processing::{DetectionError, Detector};

/// A sample brighter than this multiple of its neighbours' mean is dead.
const HOT_RATIO: f64 = 5.0;

/// A sample darker than this fraction of its neighbours' mean is dead.
const COLD_RATIO: f64 = 0.15;

/// Detector bundled with the worker binary.
///
/// Confirms the layout is present, decodes the crop and reports its
/// geometry and pixel statistics. Registration against the layout raster is
/// left to a dedicated matcher plugged in through [`Detector`].
pub struct RasterSummaryDetector {
    layouts: LayoutCatalog,
}

#[derive(Debug, Serialize)]
struct RasterSummary {
    layout: String,
    source: &'static str,
    width: u32,
    height: u32,
    channels: u32,
    mean_intensity: f64,
    dead_pixel_count: u64,
}

impl RasterSummaryDetector {
    pub fn new(layouts: LayoutCatalog) -> Self {
        Self { layouts }
    }
}

impl Detector for RasterSummaryDetector {
    fn detect(
        &self,
        layout_name: &str,
        payload: &[u8],
        shape: Option<&PayloadShape>,
    ) -> Result<serde_json::Value, DetectionError> {
        if !self.layouts.contains(layout_name) {
            return Err(DetectionError::UnknownLayout(layout_name.to_string()));
        }
        if let Some(path) = self.layouts.path_of(layout_name) {
            if !path.is_file() {
                return Err(DetectionError::UnknownLayout(layout_name.to_string()));
            }
        }

        let raster = decode(payload, shape)?;
        let summary = RasterSummary {
            layout: layout_name.to_string(),
            source: raster.source,
            width: raster.width,
            height: raster.height,
            channels: raster.channels,
            mean_intensity: mean(&raster.samples),
            dead_pixel_count: dead_pixels(&raster),
        };

        serde_json::to_value(summary).map_err(|e| DetectionError::Failed(e.to_string()))
    }
}

struct Raster {
    source: &'static str,
    width: u32,
    height: u32,
    channels: u32,
    samples: Vec<u8>,
}

/// Decode an encoded image, or fall back to a raw interleaved 8-bit
/// raster described by `shape`.
fn decode(payload: &[u8], shape: Option<&PayloadShape>) -> Result<Raster, DetectionError> {
    if payload.is_empty() {
        return Err(DetectionError::MalformedPayload("empty payload".to_string()));
    }

    if image::guess_format(payload).is_ok() {
        let decoded = image::load_from_memory(payload)
            .map_err(|e| DetectionError::MalformedPayload(e.to_string()))?;
        let channels = u32::from(decoded.color().channel_count());
        let (width, height) = (decoded.width(), decoded.height());
        let samples = match channels {
            1 => decoded.into_luma8().into_raw(),
            2 => decoded.into_luma_alpha8().into_raw(),
            3 => decoded.into_rgb8().into_raw(),
            _ => decoded.into_rgba8().into_raw(),
        };
        return Ok(Raster {
            source: "encoded",
            width,
            height,
            channels: channels.min(4),
            samples,
        });
    }

    let shape = shape.ok_or_else(|| {
        DetectionError::MalformedPayload(
            "payload is not a recognised image and no shape was given".to_string(),
        )
    })?;
    let channels = shape.channels.unwrap_or(1);
    let expected = shape.width as u64 * shape.height as u64 * channels as u64;
    if expected != payload.len() as u64 {
        return Err(DetectionError::MalformedPayload(format!(
            "expected {expected} bytes for {}x{}x{channels}, got {}",
            shape.width,
            shape.height,
            payload.len()
        )));
    }

    Ok(Raster {
        source: "raw",
        width: shape.width,
        height: shape.height,
        channels,
        samples: payload.to_vec(),
    })
}

fn mean(samples: &[u8]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let total: u64 = samples.iter().map(|&s| u64::from(s)).sum();
    total as f64 / samples.len() as f64
}

/// Pixels with at least one channel far outside its 3x3 neighbourhood.
///
/// Each sample is compared with the mean of the in-bounds samples around
/// it in the same channel. Edge and corner pixels have fewer neighbours.
fn dead_pixels(raster: &Raster) -> u64 {
    let width = raster.width as usize;
    let height = raster.height as usize;
    let channels = raster.channels as usize;
    if width == 0 || height == 0 || channels == 0 {
        return 0;
    }
    let sample =
        |x: usize, y: usize, c: usize| f64::from(raster.samples[(y * width + x) * channels + c]);

    let mut count = 0;
    for y in 0..height {
        for x in 0..width {
            let dead = (0..channels).any(|c| {
                let mut sum = 0.0;
                let mut neighbours = 0u32;
                for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                    for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                        if (nx, ny) != (x, y) {
                            sum += sample(nx, ny, c);
                            neighbours += 1;
                        }
                    }
                }
                if neighbours == 0 {
                    return false;
                }
                let mean = sum / f64::from(neighbours);
                let value = sample(x, y, c);
                value > mean * HOT_RATIO || value < mean * COLD_RATIO
            });
            if dead {
                count += 1;
            }
        }
    }
    count
}
