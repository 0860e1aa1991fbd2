//! Slide rasterization for vision analysis.
//!
//! A [`SlideRenderer`] opens one [`RenderSession`] per presentation; the session owns every
//! external resource it acquires (child processes, temporary directories) and releases them
//! when dropped. Two backends exist: [`OfficeRenderer`] drives headless LibreOffice and
//! `pdftoppm`, and [`OverlayRenderer`] composes a layout preview in-process from the package
//! itself. [`select_renderer`] picks the first one available on the host.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use image::{DynamicImage, ImageFormat, Rgb, RgbImage, imageops};
use thiserror::Error;

use crate::pptx::{PptxError, PptxPackage, ShapeKind};

const CONVERT_TIMEOUT: Duration = Duration::from_secs(120);
const RASTER_TIMEOUT: Duration = Duration::from_secs(30);
const STDERR_LIMIT: u64 = 64 * 1024;
const STDERR_GRACE: Duration = Duration::from_secs(1);
const OVERLAY_WIDTH: u32 = 1280;
const MAX_OVERLAY_HEIGHT: u32 = 4 * OVERLAY_WIDTH;

/// Errors raised while rendering a slide.
#[derive(Debug, Error)]
pub enum RenderError {
    /// An external program could not be started.
    #[error("failed to launch {program}: {source}")]
    Spawn {
        /// Program name.
        program: String,
        /// Launch failure.
        source: std::io::Error,
    },
    /// An external program exited unsuccessfully.
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        /// Program name.
        program: String,
        /// Exit status.
        status: ExitStatus,
        /// Captured standard error.
        stderr: String,
    },
    /// An external program exceeded its time budget and was killed.
    #[error("{program} timed out after {timeout:?}")]
    Timeout {
        /// Program name.
        program: String,
        /// Budget that was exceeded.
        timeout: Duration,
    },
    /// Expected output file was not produced.
    #[error("expected output {0} was not produced")]
    MissingOutput(PathBuf),
    /// Filesystem failure.
    #[error("render I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// Image decoding or encoding failure.
    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),
    /// Presentation package could not be read.
    #[error(transparent)]
    Package(#[from] PptxError),
}

/// Backend able to rasterize the slides of a presentation.
pub trait SlideRenderer: Send + Sync {
    /// Backend label for logs.
    fn name(&self) -> &'static str;

    /// Acquire the resources needed to render slides of `deck`.
    fn open(&self, deck: &Path) -> Result<Box<dyn RenderSession>, RenderError>;
}

/// Per-document rendering session.
pub trait RenderSession: Send {
    /// Render the slide at `index` (0-based) as PNG bytes.
    fn render_slide(&mut self, index: usize) -> Result<Vec<u8>, RenderError>;
}

/// Pick the best renderer available on this host.
pub fn select_renderer() -> Arc<dyn SlideRenderer> {
    match OfficeRenderer::detect() {
        Some(renderer) => {
            tracing::info!(renderer = renderer.name(), "Using office slide renderer");
            Arc::new(renderer)
        }
        None => {
            tracing::info!("Office tools not found; using overlay slide renderer");
            Arc::new(OverlayRenderer::new())
        }
    }
}

/// Kills and reaps the child process unless it already exited.
///
/// Standard error is drained on a separate thread while the child runs, so a chatty helper
/// cannot block on a full pipe.
struct ChildGuard {
    program: String,
    child: Child,
    stderr: Option<Receiver<String>>,
    finished: bool,
}

impl ChildGuard {
    fn spawn(program: &str, command: &mut Command) -> Result<Self, RenderError> {
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RenderError::Spawn {
                program: program.to_string(),
                source,
            })?;
        let stderr = child.stderr.take().map(drain_stderr);
        Ok(Self {
            program: program.to_string(),
            child,
            stderr,
            finished: false,
        })
    }

    fn wait(mut self, timeout: Duration) -> Result<(), RenderError> {
        let started = Instant::now();
        let status = loop {
            if let Some(status) = self.child.try_wait()? {
                self.finished = true;
                break status;
            }
            if started.elapsed() >= timeout {
                return Err(RenderError::Timeout {
                    program: self.program.clone(),
                    timeout,
                });
            }
            std::thread::sleep(Duration::from_millis(100));
        };
        if status.success() {
            return Ok(());
        }
        // A grandchild may still hold the pipe open after the child exits.
        let stderr = self
            .stderr
            .take()
            .and_then(|receiver| receiver.recv_timeout(STDERR_GRACE).ok())
            .unwrap_or_default();
        Err(RenderError::Failed {
            program: self.program.clone(),
            status,
            stderr: stderr.trim().to_string(),
        })
    }
}

/// Read the pipe to EOF on a background thread, keeping the first [`STDERR_LIMIT`] bytes.
fn drain_stderr(mut pipe: ChildStderr) -> Receiver<String> {
    let (sender, receiver) = mpsc::channel();
    std::thread::spawn(move || {
        let mut kept = Vec::new();
        let _ = (&mut pipe).take(STDERR_LIMIT).read_to_end(&mut kept);
        let _ = std::io::copy(&mut pipe, &mut std::io::sink());
        let _ = sender.send(String::from_utf8_lossy(&kept).into_owned());
    });
    receiver
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(error) = self.child.kill() {
            tracing::debug!(program = %self.program, %error, "Child already gone");
        }
        let _ = self.child.wait();
        tracing::warn!(program = %self.program, "Killed render helper process");
    }
}

/// Removes the directory tree on drop.
struct TempDirGuard {
    path: PathBuf,
}

impl TempDirGuard {
    fn create() -> Result<Self, RenderError> {
        let path = std::env::temp_dir().join(format!("rustyrag-render-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        if let Err(error) = std::fs::remove_dir_all(&self.path) {
            tracing::warn!(path = %self.path.display(), %error, "Failed to remove render directory");
        }
    }
}

/// Headless LibreOffice conversion to PDF followed by `pdftoppm` rasterization.
#[derive(Debug, Clone)]
pub struct OfficeRenderer {
    office: String,
    rasterizer: String,
    dpi: u32,
}

impl OfficeRenderer {
    /// Renderer using explicit program names.
    pub fn new(office: impl Into<String>, rasterizer: impl Into<String>) -> Self {
        Self {
            office: office.into(),
            rasterizer: rasterizer.into(),
            dpi: 100,
        }
    }

    /// Probe the host for `soffice`/`libreoffice` and `pdftoppm`.
    pub fn detect() -> Option<Self> {
        let office = ["soffice", "libreoffice"]
            .into_iter()
            .find(|program| launches(program, "--version"))?;
        launches("pdftoppm", "-v").then(|| Self::new(office, "pdftoppm"))
    }
}

fn launches(program: &str, flag: &str) -> bool {
    Command::new(program)
        .arg(flag)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

impl SlideRenderer for OfficeRenderer {
    fn name(&self) -> &'static str {
        "office"
    }

    fn open(&self, deck: &Path) -> Result<Box<dyn RenderSession>, RenderError> {
        let workdir = TempDirGuard::create()?;
        // A private profile keeps concurrent conversions from fighting over the user profile lock.
        let profile = format!("-env:UserInstallation=file://{}/profile", workdir.path.display());
        ChildGuard::spawn(
            &self.office,
            Command::new(&self.office)
                .arg(profile)
                .args(["--headless", "--convert-to", "pdf", "--outdir"])
                .arg(&workdir.path)
                .arg(deck),
        )?
        .wait(CONVERT_TIMEOUT)?;

        let stem = deck
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "deck".to_string());
        let pdf = workdir.path.join(format!("{stem}.pdf"));
        if !pdf.exists() {
            return Err(RenderError::MissingOutput(pdf));
        }
        tracing::debug!(deck = %deck.display(), pdf = %pdf.display(), "Converted deck to PDF");
        Ok(Box::new(OfficeSession {
            rasterizer: self.rasterizer.clone(),
            dpi: self.dpi,
            pdf,
            workdir,
        }))
    }
}

struct OfficeSession {
    rasterizer: String,
    dpi: u32,
    pdf: PathBuf,
    workdir: TempDirGuard,
}

impl RenderSession for OfficeSession {
    fn render_slide(&mut self, index: usize) -> Result<Vec<u8>, RenderError> {
        let page = (index + 1).to_string();
        let prefix = self.workdir.path.join(format!("slide-{page}"));
        ChildGuard::spawn(
            &self.rasterizer,
            Command::new(&self.rasterizer)
                .args(["-png", "-singlefile", "-r"])
                .arg(self.dpi.to_string())
                .args(["-f", &page, "-l", &page])
                .arg(&self.pdf)
                .arg(&prefix),
        )?
        .wait(RASTER_TIMEOUT)?;

        let png = prefix.with_extension("png");
        if !png.exists() {
            return Err(RenderError::MissingOutput(png));
        }
        let bytes = std::fs::read(&png)?;
        std::fs::remove_file(&png)?;
        Ok(bytes)
    }
}

/// In-process preview: pictures composited at their positions, text and table frames outlined.
#[derive(Debug, Clone, Default)]
pub struct OverlayRenderer;

impl OverlayRenderer {
    /// Create the renderer.
    pub fn new() -> Self {
        Self
    }
}

impl SlideRenderer for OverlayRenderer {
    fn name(&self) -> &'static str {
        "overlay"
    }

    fn open(&self, deck: &Path) -> Result<Box<dyn RenderSession>, RenderError> {
        let mut package = PptxPackage::open(deck)?;
        let (cx, cy) = package.slide_size()?;
        let scale = f64::from(OVERLAY_WIDTH) / cx.max(1) as f64;
        let height = ((cy as f64 * scale).round() as u32).clamp(1, MAX_OVERLAY_HEIGHT);
        Ok(Box::new(OverlaySession {
            package,
            scale,
            width: OVERLAY_WIDTH,
            height,
        }))
    }
}

struct OverlaySession {
    package: PptxPackage,
    scale: f64,
    width: u32,
    height: u32,
}

impl OverlaySession {
    fn to_pixels(&self, emu: i64) -> i64 {
        (emu as f64 * self.scale).round() as i64
    }
}

impl RenderSession for OverlaySession {
    fn render_slide(&mut self, index: usize) -> Result<Vec<u8>, RenderError> {
        let slide = self.package.read_slide(index)?;
        let mut canvas = RgbImage::from_pixel(self.width, self.height, Rgb([255, 255, 255]));

        for shape in slide.valid_shapes() {
            let geometry = shape.geometry;
            let (x, y) = (self.to_pixels(geometry.x), self.to_pixels(geometry.y));
            let (w, h) = (self.to_pixels(geometry.cx), self.to_pixels(geometry.cy));
            let frame = Frame { x, y, w, h };
            if frame.clip(canvas.width(), canvas.height()).is_none() {
                continue;
            }
            match &shape.kind {
                ShapeKind::Picture {
                    image_part: Some(part),
                } => {
                    let bytes = self.package.read_binary_part(part)?;
                    match image::load_from_memory(&bytes) {
                        Ok(picture) => place_picture(&mut canvas, &picture.to_rgb8(), frame),
                        Err(error) => {
                            tracing::debug!(part = %part, %error, "Skipping undecodable picture");
                        }
                    }
                }
                ShapeKind::Table { .. } => outline(&mut canvas, frame, Rgb([40, 40, 40])),
                ShapeKind::TextFrame { .. } => outline(&mut canvas, frame, Rgb([150, 150, 150])),
                ShapeKind::Picture { image_part: None } | ShapeKind::Other => {}
            }
        }

        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(canvas).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }
}

/// Shape rectangle in canvas pixels; may extend past the canvas in any direction.
#[derive(Debug, Clone, Copy)]
struct Frame {
    x: i64,
    y: i64,
    w: i64,
    h: i64,
}

/// Visible part of a [`Frame`], inside the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Visible {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
}

impl Frame {
    fn right(&self) -> i64 {
        self.x.saturating_add(self.w)
    }

    fn bottom(&self) -> i64 {
        self.y.saturating_add(self.h)
    }

    fn clip(&self, width: u32, height: u32) -> Option<Visible> {
        if self.w <= 0 || self.h <= 0 {
            return None;
        }
        let (x0, y0) = (self.x.max(0), self.y.max(0));
        let x1 = self.right().min(i64::from(width));
        let y1 = self.bottom().min(i64::from(height));
        (x1 > x0 && y1 > y0).then(|| Visible {
            x: x0 as u32,
            y: y0 as u32,
            w: (x1 - x0) as u32,
            h: (y1 - y0) as u32,
        })
    }
}

/// Scale `picture` onto `frame`, resampling only the part that lands on the canvas.
fn place_picture(canvas: &mut RgbImage, picture: &RgbImage, frame: Frame) {
    let Some(visible) = frame.clip(canvas.width(), canvas.height()) else {
        return;
    };
    let (pw, ph) = picture.dimensions();
    if pw == 0 || ph == 0 {
        return;
    }
    let source_span = |offset: u32, length: u32, origin: i64, extent: i64, size: u32| {
        let ratio = f64::from(size) / extent as f64;
        let start = ((i64::from(offset) - origin) as f64 * ratio).floor() as u32;
        let end = ((i64::from(offset + length) - origin) as f64 * ratio).ceil() as u32;
        let start = start.min(size - 1);
        (start, end.clamp(start + 1, size) - start)
    };
    let (sx, sw) = source_span(visible.x, visible.w, frame.x, frame.w, pw);
    let (sy, sh) = source_span(visible.y, visible.h, frame.y, frame.h, ph);
    let crop = imageops::crop_imm(picture, sx, sy, sw, sh).to_image();
    let resized = imageops::resize(&crop, visible.w, visible.h, imageops::FilterType::Triangle);
    imageops::overlay(canvas, &resized, i64::from(visible.x), i64::from(visible.y));
}

/// Draw the border of `frame`, visiting only pixels inside the canvas.
fn outline(canvas: &mut RgbImage, frame: Frame, color: Rgb<u8>) {
    let Some(visible) = frame.clip(canvas.width(), canvas.height()) else {
        return;
    };
    let (right, bottom) = (frame.right() - 1, frame.bottom() - 1);
    let columns = visible.x..visible.x + visible.w;
    let rows = visible.y..visible.y + visible.h;
    for edge in [frame.y, bottom] {
        if let Ok(py) = u32::try_from(edge)
            && rows.contains(&py)
        {
            for px in columns.clone() {
                canvas.put_pixel(px, py, color);
            }
        }
    }
    for edge in [frame.x, right] {
        if let Ok(px) = u32::try_from(edge)
            && columns.contains(&px)
        {
            for py in rows.clone() {
                canvas.put_pixel(px, py, color);
            }
        }
    }
}
