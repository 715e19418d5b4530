//! Full-resolution export. Renders on a dedicated worker with its own kernel service, so
//! an export never waits behind interactive renders, then encodes JPEG or PNG.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};

use crate::context::GpuContext;
use crate::edit_state::EditState;
use crate::errors::{FxError, Result};
use crate::graph::FilterGraph;
use crate::proxy::SourceImage;
use crate::settings::{EngineSettings, ExportFormat};

#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub source: SourceImage,
    pub state: EditState,
    pub path: PathBuf,
    /// Overrides the format implied by the path extension
    pub format: Option<ExportFormat>,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
}

impl ExportRequest {
    pub fn new(source: SourceImage, state: EditState, path: impl Into<PathBuf>) -> Self {
        Self {
            source,
            state,
            path: path.into(),
            format: None,
            max_width: None,
            max_height: None,
        }
    }

    pub fn with_format(mut self, format: ExportFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_max_size(mut self, max_width: Option<u32>, max_height: Option<u32>) -> Self {
        self.max_width = max_width;
        self.max_height = max_height;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub path: PathBuf,
    pub format: ExportFormat,
    pub width: u32,
    pub height: u32,
    pub elapsed: Duration,
}

/// Picks the encoder for `path`. An explicit format wins; a path without an extension
/// gets `fallback` and an unknown extension is rejected.
pub fn resolve_format(path: &Path, explicit: Option<ExportFormat>, fallback: ExportFormat) -> Result<ExportFormat> {
    if let Some(format) = explicit {
        return Ok(format);
    }
    match path.extension() {
        None => Ok(fallback),
        Some(ext) => ExportFormat::from_path(path).ok_or_else(|| FxError::UnsupportedFormat {
            extension: ext.to_string_lossy().to_string(),
        }),
    }
}

/// Downscales to fit the optional bounds, preserving aspect ratio.
fn fit_within(image: DynamicImage, max_width: Option<u32>, max_height: Option<u32>) -> DynamicImage {
    let (w, h) = image.dimensions();
    match (max_width, max_height) {
        (Some(max_w), Some(max_h)) if w > max_w || h > max_h => image.resize(max_w, max_h, FilterType::Lanczos3),
        (Some(max_w), None) if w > max_w => {
            let new_h = ((h as f32 * max_w as f32 / w as f32) as u32).max(1);
            image.resize(max_w, new_h, FilterType::Lanczos3)
        }
        (None, Some(max_h)) if h > max_h => {
            let new_w = ((w as f32 * max_h as f32 / h as f32) as u32).max(1);
            image.resize(new_w, max_h, FilterType::Lanczos3)
        }
        _ => image,
    }
}

/// Encodes `image` to `path`. JPEG drops alpha.
pub fn encode_image(image: &DynamicImage, path: &Path, format: ExportFormat, quality: u8) -> Result<()> {
    let file = File::create(path).map_err(|e| FxError::from_export_io(path, e))?;
    let mut output = BufWriter::new(file);
    match format {
        ExportFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
            let encoder = JpegEncoder::new_with_quality(&mut output, quality.clamp(1, 100));
            rgb.write_with_encoder(encoder).map_err(|e| FxError::from_export(path, e))?;
        }
        ExportFormat::Png => {
            DynamicImage::ImageRgba8(image.to_rgba8())
                .write_to(&mut output, ImageFormat::Png)
                .map_err(|e| FxError::from_export(path, e))?;
        }
    }
    std::io::Write::flush(&mut output).map_err(|e| FxError::from_export_io(path, e))?;
    Ok(())
}

type Job = (ExportRequest, Sender<Result<ExportOutcome>>);

/// Handle to a submitted export.
pub struct ExportTicket {
    result: Receiver<Result<ExportOutcome>>,
}

impl ExportTicket {
    pub fn wait(self) -> Result<ExportOutcome> {
        self.result.recv().map_err(|_| FxError::WorkerStopped { worker: "export" })?
    }

    pub fn try_result(&self) -> Option<Result<ExportOutcome>> {
        self.result.try_recv().ok()
    }
}

pub struct Exporter {
    jobs: Option<Sender<Job>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Exporter {
    pub fn spawn(graph: Arc<FilterGraph>, context: &GpuContext, settings: &EngineSettings) -> Result<Self> {
        let (jobs, rx) = mpsc::channel::<Job>();
        let mut kernels = context.kernel_service();
        let fallback = settings.export_format;
        let quality = settings.jpeg_quality;

        let worker = thread::Builder::new().name("lume-export".to_string()).spawn(move || {
            while let Ok((request, reply)) = rx.recv() {
                let start = Instant::now();
                let result = resolve_format(&request.path, request.format, fallback).and_then(|format| {
                    let rendered = graph.apply_edits(request.source.frame(), &request.state, &mut kernels);
                    let image = fit_within(rendered.to_dynamic(), request.max_width, request.max_height);
                    encode_image(&image, &request.path, format, quality)?;
                    Ok(ExportOutcome {
                        path: request.path.clone(),
                        format,
                        width: image.width(),
                        height: image.height(),
                        elapsed: start.elapsed(),
                    })
                });
                match &result {
                    Ok(outcome) => log::info!(
                        "Exported {} ({}x{}) in {} ms",
                        outcome.path.display(),
                        outcome.width,
                        outcome.height,
                        outcome.elapsed.as_millis()
                    ),
                    Err(e) => log::error!("Export to {} failed: {}", request.path.display(), e),
                }
                let _ = reply.send(result);
            }
            tracing::debug!("export worker stopped");
        })?;

        Ok(Self { jobs: Some(jobs), worker: Some(worker) })
    }

    /// Queues an export. Exports run one at a time in submission order.
    pub fn submit(&self, request: ExportRequest) -> Result<ExportTicket> {
        let (reply, result) = mpsc::channel();
        let jobs = self.jobs.as_ref().ok_or(FxError::WorkerStopped { worker: "export" })?;
        jobs.send((request, reply)).map_err(|_| FxError::WorkerStopped { worker: "export" })?;
        Ok(ExportTicket { result })
    }

    pub fn export(&self, request: ExportRequest) -> Result<ExportOutcome> {
        self.submit(request)?.wait()
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Export worker panicked");
            }
        }
    }
}

impl Drop for Exporter {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::graph::OverlayStore;
    use crate::lut::LutEngine;
    use crate::presets::PresetCatalog;

    fn exporter() -> Exporter {
        let settings = EngineSettings::default();
        let luts = Arc::new(LutEngine::new(None, 4));
        let context = GpuContext::cpu_only(&settings, Arc::clone(&luts));
        let graph = Arc::new(FilterGraph::new(
            luts,
            Arc::new(PresetCatalog::builtin()),
            Arc::new(OverlayStore::new(None)),
        ));
        Exporter::spawn(graph, &context, &settings).unwrap()
    }

    fn source() -> SourceImage {
        SourceImage::new(Frame::solid(40, 30, [0.2, 0.4, 0.6, 1.0]))
    }

    #[test]
    fn format_resolution() {
        let jpeg = ExportFormat::Jpeg;
        assert_eq!(resolve_format(Path::new("a.PNG"), None, jpeg).unwrap(), ExportFormat::Png);
        assert_eq!(resolve_format(Path::new("a"), None, jpeg).unwrap(), ExportFormat::Jpeg);
        assert_eq!(resolve_format(Path::new("a.gif"), Some(ExportFormat::Png), jpeg).unwrap(), ExportFormat::Png);
        assert!(matches!(
            resolve_format(Path::new("a.tiff"), None, jpeg),
            Err(FxError::UnsupportedFormat { extension }) if extension == "tiff"
        ));
    }

    #[test]
    fn exports_png_at_full_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        let state = EditState { brightness: 0.1, ..Default::default() };
        let outcome = exporter().export(ExportRequest::new(source(), state, &path)).unwrap();

        assert_eq!((outcome.width, outcome.height), (40, 30));
        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (40, 30));
        let px = decoded.get_pixel(5, 5);
        assert!((px[0] as i32 - 77).abs() <= 1);
    }

    #[test]
    fn exports_jpeg_within_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jpg");
        let request = ExportRequest::new(source(), EditState::default(), &path).with_max_size(Some(20), None);
        let outcome = exporter().export(request).unwrap();

        assert_eq!(outcome.format, ExportFormat::Jpeg);
        assert_eq!((outcome.width, outcome.height), (20, 15));
        assert_eq!(image::open(&path).unwrap().dimensions(), (20, 15));
    }

    #[test]
    fn unknown_extension_is_user_facing() {
        let dir = tempfile::tempdir().unwrap();
        let err = exporter()
            .export(ExportRequest::new(source(), EditState::default(), dir.path().join("out.bmp")))
            .unwrap_err();
        assert!(matches!(err, FxError::UnsupportedFormat { .. }));
        assert!(err.is_user_facing());
    }

    #[test]
    fn missing_directory_fails_to_encode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.png");
        let err = exporter().export(ExportRequest::new(source(), EditState::default(), &path)).unwrap_err();
        assert!(matches!(err, FxError::EncodeFailed { .. }));
    }
}
