//! PDF rasterization through an external tool.
//!
//! The rasterizer writes one raster per page into a scratch directory; the
//! pages are then stacked top to bottom into a single raster.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::ConversionError;
use crate::job::ProgressRange;
use crate::raster::{RasterReader, RasterWriter};

use super::{extension_of, Converter, RASTER_EXTENSION};

/// Default rasterization resolution.
pub const DEFAULT_PDF_DPI: u32 = 150;

/// Default rasterizer executable (poppler's `pdftoppm`).
pub const DEFAULT_RASTERIZER: &str = "pdftoppm";

/// Colour used to pad narrow pages and damaged rows.
const PAD_BYTE: u8 = 0xFF;

/// Share of the progress range spent in the external rasterizer.
const RASTERIZE_SHARE: f64 = 0.8;

/// How often a running rasterizer is checked for exit and cancellation.
const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// File in the scratch directory receiving the rasterizer's stderr.
const RASTERIZER_LOG: &str = "rasterizer.log";

/// Rasterizes PDF documents by running an external tool.
#[derive(Debug, Clone)]
pub struct PdfConverter {
    dpi: u32,
    program: PathBuf,
}

impl PdfConverter {
    pub fn new(dpi: u32, program: impl Into<PathBuf>) -> Self {
        Self {
            dpi,
            program: program.into(),
        }
    }

    /// Run the rasterizer, killing it if the job is cancelled.
    fn rasterize(
        &self,
        input: &Path,
        scratch: &Path,
        progress: &ProgressRange<'_>,
    ) -> Result<(), ConversionError> {
        let tool = self.program.display().to_string();
        debug!(tool = %tool, dpi = self.dpi, input = %input.display(), "running rasterizer");

        // Diagnostics go to a file so a chatty tool never blocks on a full pipe
        let log_path = scratch.join(RASTERIZER_LOG);
        let log = File::create(&log_path)?;

        let mut child = Command::new(&self.program)
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg(input)
            .arg(scratch.join("page"))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(log)
            .spawn()
            .map_err(|e| ConversionError::Spawn {
                tool: tool.clone(),
                message: e.to_string(),
            })?;

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if progress.is_cancelled() {
                warn!(tool = %tool, pid = child.id(), "killing rasterizer of cancelled job");
                if let Err(e) = child.kill() {
                    warn!(tool = %tool, error = %e, "failed to kill rasterizer");
                }
                let _ = child.wait();
                return Err(ConversionError::Cancelled { tool });
            }
            thread::sleep(CHILD_POLL_INTERVAL);
        };

        if !status.success() {
            let stderr = fs::read_to_string(&log_path).unwrap_or_default();
            return Err(ConversionError::Tool {
                tool,
                status: status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

impl Converter for PdfConverter {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn convert(
        &self,
        input: &Path,
        output: &Path,
        progress: ProgressRange<'_>,
    ) -> Result<(), ConversionError> {
        let scratch = ScratchDir::create(output.with_extension("pages"))?;

        self.rasterize(input, scratch.path(), &progress)?;
        progress.set(RASTERIZE_SHARE);

        let pages = page_files(scratch.path())?;
        if pages.is_empty() {
            return Err(ConversionError::NoPages {
                path: input.to_path_buf(),
            });
        }

        let summary = merge_pages(&pages, output)?;
        info!(
            input = %input.display(),
            pages = summary.pages_merged,
            skipped = summary.pages_skipped,
            width = summary.width,
            height = summary.height,
            "pdf rasterized"
        );
        progress.finish();
        Ok(())
    }
}

/// Page rasters in a scratch directory, in page order.
fn page_files(dir: &Path) -> Result<Vec<PathBuf>, ConversionError> {
    let mut pages: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| extension_of(path) == RASTER_EXTENSION)
        .collect();

    // Page numbers are zero-padded only to the width of the largest one
    pages.sort_by_key(|path| {
        let name = path.file_name().map(|n| n.len()).unwrap_or(0);
        (name, path.clone())
    });
    Ok(pages)
}

/// Deleted with its contents on drop.
struct ScratchDir(PathBuf);

impl ScratchDir {
    fn create(path: PathBuf) -> Result<Self, ConversionError> {
        fs::create_dir_all(&path)?;
        Ok(Self(path))
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.0) {
            warn!(path = %self.0.display(), error = %e, "failed to remove scratch directory");
        }
    }
}

// =============================================================================
// Page Merging
// =============================================================================

/// What [`merge_pages`] produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    pub pages_merged: usize,
    pub pages_skipped: usize,
    pub width: u32,
    pub height: u32,
}

/// Stack page rasters vertically into one raster at `output`.
///
/// Pages whose header cannot be read are logged and skipped. The merged
/// height counts only the pages kept, and narrower pages are padded on the
/// right with white. If a page's pixel data ends early its missing rows are
/// filled with white, so the output always matches its header.
///
/// Headers are read in a first pass and each page is reopened only while it
/// is copied, so at most one page file is open at a time.
pub fn merge_pages(pages: &[PathBuf], output: &Path) -> Result<MergeSummary, ConversionError> {
    let mut kept = Vec::with_capacity(pages.len());
    for page in pages {
        match RasterReader::open(page) {
            Ok(reader) => kept.push(PageHeader {
                path: page,
                width: reader.width(),
                height: reader.height(),
            }),
            Err(e) => warn!(page = %page.display(), error = %e, "skipping unreadable page"),
        }
    }

    let pages_skipped = pages.len() - kept.len();
    if kept.is_empty() {
        return Err(ConversionError::NoPages {
            path: output.to_path_buf(),
        });
    }

    let width = kept.iter().map(|page| page.width).max().unwrap_or(0);
    let total_height: u64 = kept.iter().map(|page| u64::from(page.height)).sum();
    let height = u32::try_from(total_height).map_err(|_| {
        ConversionError::Io(format!("merged height {} exceeds limits", total_height))
    })?;

    let mut writer = RasterWriter::create(output, width, height)?;
    let mut row = vec![PAD_BYTE; writer.scanline_len()];

    for page in &kept {
        let mut reader = match RasterReader::open(page.path) {
            Ok(reader) if (reader.width(), reader.height()) == (page.width, page.height) => {
                Some(reader)
            }
            Ok(_) => {
                warn!(page = %page.path.display(), "page changed while merging, padding it");
                None
            }
            Err(e) => {
                warn!(page = %page.path.display(), error = %e, "page unreadable on reopen, padding it");
                None
            }
        };

        for _ in 0..page.height {
            let mut damaged = false;
            let line = match reader.as_mut() {
                Some(reader) => match reader.next_scanline() {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(page = %page.path.display(), error = %e, "page data damaged, padding remaining rows");
                        damaged = true;
                        None
                    }
                },
                None => None,
            };

            match line {
                Some(line) => {
                    row[..line.len()].copy_from_slice(line);
                    row[line.len()..].fill(PAD_BYTE);
                }
                None => row.fill(PAD_BYTE),
            }
            writer.write_scanline(&row)?;

            if damaged {
                reader = None;
            }
        }
    }
    writer.finish()?;

    Ok(MergeSummary {
        pages_merged: kept.len(),
        pages_skipped,
        width,
        height,
    })
}

/// Dimensions of a page read in the first merge pass.
struct PageHeader<'a> {
    path: &'a Path,
    width: u32,
    height: u32,
}
