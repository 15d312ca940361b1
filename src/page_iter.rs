//! Iterate over the pages of a scanned document as images.
//!
//! PDFs are rasterized with Poppler's `pdftocairo`, multi-page TIFFs are
//! decoded in-process, and ordinary images are a single page.

use std::{
    collections::BTreeMap,
    fs,
    io::{BufReader, Cursor},
    process::Output,
    sync::LazyLock,
    vec,
};

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage, RgbaImage};
use regex::Regex;
use tiff::{
    ColorType,
    decoder::{Decoder, DecodingResult},
};
use tokio::process::Command;

use crate::{
    async_utils::{
        blocking_iter_streams::spawn_blocking_propagating_panics,
        check_for_command_failure,
    },
    config::OcrConfig,
    cpu_limit::with_cpu_semaphore,
    prelude::*,
};

/// Image types we treat as a single page.
const SINGLE_PAGE_IMAGE_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/webp",
    "image/gif",
    "image/bmp",
];

const TIFF_MIME_TYPE: &str = "image/tiff";
const PDF_MIME_TYPE: &str = "application/pdf";

static ERROR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)error").expect("failed to compile regex"));

/// Poppler reports recoverable xref damage as an error.
static DOWNGRADE_TO_WARNING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)error: xref num").expect("failed to compile regex")
});

/// Does this line of Poppler output report a real error?
fn is_error_line(line: &str) -> bool {
    ERROR_REGEX.is_match(line) && !DOWNGRADE_TO_WARNING_REGEX.is_match(line)
}

/// One page of a document, as an encoded image.
#[derive(Debug)]
pub struct Page {
    /// One of the single-page image MIME types.
    pub mime_type: String,
    /// The encoded image.
    pub data: Vec<u8>,
}

/// An iterator over the page images of a document.
pub struct PageIter {
    /// Holds extracted pages, if we had to extract any. Deleted on drop.
    tmpdir: Option<tempfile::TempDir>,
    mime_type: String,
    paths: vec::IntoIter<PathBuf>,
    /// Pages in the document, including any beyond `max_pages`.
    total_pages: usize,
    max_pages: Option<usize>,
    /// Diagnostics printed by external tools.
    warnings: Vec<String>,
}

impl PageIter {
    /// Open a document, choosing a strategy based on its detected MIME type.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub async fn from_path(path: &Path, config: &OcrConfig) -> Result<Self> {
        let mime_type = get_mime_type(path)?;
        debug!(%mime_type, "Detected document type");
        if SINGLE_PAGE_IMAGE_TYPES.contains(&mime_type.as_str()) {
            Ok(Self {
                tmpdir: None,
                mime_type,
                paths: vec![path.to_owned()].into_iter(),
                total_pages: 1,
                max_pages: config.max_pages,
                warnings: vec![],
            })
        } else if mime_type == TIFF_MIME_TYPE {
            Self::from_tiff(path, config.max_pages).await
        } else if mime_type == PDF_MIME_TYPE {
            Self::from_pdf(path, config).await
        } else {
            Err(anyhow!(
                "unsupported MIME type {} for {:?} (supported: PDF, TIFF, PNG, JPEG, WebP, GIF, BMP)",
                mime_type,
                path.display()
            ))
        }
    }

    /// Rasterize a PDF to one PNG per page.
    #[instrument(level = "debug", skip_all, fields(path = %path.display(), dpi = config.pdf_dpi))]
    async fn from_pdf(path: &Path, config: &OcrConfig) -> Result<Self> {
        let total_pages = get_pdf_page_count(path, config).await?;

        let stem = path
            .file_stem()
            .context("failed to get filename from PDF path")?;
        let tmpdir = tempfile::TempDir::with_prefix("pages")?;
        let out_prefix = tmpdir.path().join(stem);

        // pdftocairo keeps a whole core busy, so it shares the CPU semaphore
        // with tesseract.
        let mut cmd = Command::new(config.poppler_command("pdftocairo"));
        cmd.arg("-png").arg("-r").arg(config.pdf_dpi.to_string());
        if let Some(max_pages) = config.max_pages
            && total_pages > max_pages
        {
            // Poppler pages are 1-based and the range is inclusive.
            cmd.arg("-l").arg(max_pages.to_string());
        }
        let output = with_cpu_semaphore(|| async move {
            cmd.arg(path).arg(&out_prefix).output().await.with_context(|| {
                format!("failed to run pdftocairo on {:?}", path.display())
            })
        })
        .await?;
        check_for_command_failure("pdftocairo", &output, Some(&is_error_line))?;

        let paths = sorted_dir_entries(tmpdir.path())?;
        Ok(Self {
            tmpdir: Some(tmpdir),
            mime_type: "image/png".to_owned(),
            paths: paths.into_iter(),
            total_pages,
            max_pages: config.max_pages,
            warnings: output_lines(&output),
        })
    }

    /// Decode each TIFF page (IFD) to a PNG.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    async fn from_tiff(path: &Path, max_pages: Option<usize>) -> Result<Self> {
        let path_owned = path.to_owned();
        let (tmpdir, total_pages) = spawn_blocking_propagating_panics(move || {
            split_tiff_sync(&path_owned, max_pages)
        })
        .await?;
        let paths = sorted_dir_entries(tmpdir.path())?;
        Ok(Self {
            tmpdir: Some(tmpdir),
            mime_type: "image/png".to_owned(),
            paths: paths.into_iter(),
            total_pages,
            max_pages,
            warnings: vec![],
        })
    }

    /// Pages in the whole document.
    pub fn page_count(&self) -> usize {
        self.total_pages
    }

    /// Pages this iterator will actually return.
    pub fn pages_to_process(&self) -> usize {
        match self.max_pages {
            Some(max_pages) => self.total_pages.min(max_pages),
            None => self.total_pages,
        }
    }

    /// Diagnostics from external tools.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Will `--max-pages` cut this document short?
    pub fn is_incomplete(&self) -> bool {
        self.pages_to_process() < self.total_pages
    }

    /// Return an error describing any pages we're going to skip.
    pub fn check_complete(&self) -> Result<()> {
        if self.is_incomplete() {
            Err(anyhow!(
                "Only {}/{} pages processed (because of --max-pages)",
                self.pages_to_process(),
                self.total_pages
            ))
        } else {
            Ok(())
        }
    }
}

impl Drop for PageIter {
    fn drop(&mut self) {
        if let Some(tmpdir) = self.tmpdir.take() {
            let tmpdir_path = tmpdir.path().to_owned();
            if let Err(err) = tmpdir.close() {
                error!(
                    directory = ?tmpdir_path.display(),
                    "failed to delete temporary directory: {}",
                    err
                );
            }
        }
    }
}

impl Iterator for PageIter {
    type Item = Result<Page>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.paths.next()?;
        let data = match fs::read(&path)
            .with_context(|| format!("failed to read page {:?}", path.display()))
        {
            Ok(data) => data,
            Err(err) => return Some(Err(err)),
        };
        // Free extracted pages as we go.
        if self.tmpdir.is_some()
            && let Err(err) = fs::remove_file(&path)
        {
            warn!(path = %path.display(), "failed to delete page file: {}", err);
        }
        Some(Ok(Page {
            mime_type: self.mime_type.clone(),
            data,
        }))
    }
}

/// Get the number of pages in a PDF file using `pdfinfo`.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn get_pdf_page_count(path: &Path, config: &OcrConfig) -> Result<usize> {
    let output = Command::new(config.poppler_command("pdfinfo"))
        .arg(path)
        .output()
        .await
        .with_context(|| format!("failed to run pdfinfo on {:?}", path.display()))?;
    check_for_command_failure("pdfinfo", &output, None)?;

    let stdout =
        String::from_utf8(output.stdout).context("pdfinfo output was not valid UTF-8")?;
    let properties = stdout
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim(), value.trim()))
        .collect::<BTreeMap<_, _>>();
    properties
        .get("Pages")
        .ok_or_else(|| anyhow!("failed to find page count in pdfinfo output"))?
        .parse::<usize>()
        .with_context(|| {
            format!(
                "failed to parse page count for {:?} from pdfinfo output",
                path.display()
            )
        })
}

/// Get the MIME type of a file from its contents.
pub fn get_mime_type(path: &Path) -> Result<String> {
    Ok(infer::get_from_path(path)
        .with_context(|| format!("failed to read {:?}", path.display()))?
        .ok_or_else(|| anyhow!("unknown file type for {:?}", path.display()))?
        .mime_type()
        .to_owned())
}

/// List a directory, sorted by file name.
fn sorted_dir_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = dir
        .read_dir()
        .with_context(|| format!("failed to read directory {:?}", dir.display()))?
        .map(|entry| {
            Ok(entry
                .with_context(|| format!("failed to read entry in {:?}", dir.display()))?
                .path())
        })
        .collect::<Result<Vec<_>>>()?;
    // pdftocairo zero-pads page numbers, so lexical order is page order.
    paths.sort();
    Ok(paths)
}

/// Non-empty output lines from a command, kept as warnings.
fn output_lines(output: &Output) -> Vec<String> {
    [&output.stdout, &output.stderr]
        .into_iter()
        .flat_map(|bytes| {
            String::from_utf8_lossy(bytes)
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_owned)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Write each TIFF page as a PNG in a new temporary directory. Returns the
/// directory and the document's total page count.
fn split_tiff_sync(
    path: &Path,
    max_pages: Option<usize>,
) -> Result<(tempfile::TempDir, usize)> {
    let file = fs::File::open(path)
        .with_context(|| format!("failed to open TIFF file {:?}", path.display()))?;
    let mut decoder = Decoder::new(BufReader::new(file)).with_context(|| {
        format!("failed to create TIFF decoder for {:?}", path.display())
    })?;
    let tmpdir = tempfile::TempDir::with_prefix("tiff-pages")?;

    let mut page_idx = 0;
    loop {
        if max_pages.is_none_or(|max| page_idx < max) {
            let image = decode_tiff_page(&mut decoder, path, page_idx)?;
            let mut png = Vec::new();
            image
                .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
                .with_context(|| {
                    format!("failed to encode page {} of {:?}", page_idx + 1, path.display())
                })?;
            let png_path = tmpdir.path().join(format!("page-{page_idx:05}.png"));
            fs::write(&png_path, png)
                .with_context(|| format!("failed to write {:?}", png_path.display()))?;
        }
        page_idx += 1;

        if !decoder.more_images() {
            break;
        }
        decoder.next_image().with_context(|| {
            format!("failed to read page {} of {:?}", page_idx + 1, path.display())
        })?;
    }

    debug!(total_pages = page_idx, "Split TIFF into pages");
    Ok((tmpdir, page_idx))
}

/// Decode the decoder's current page. 16-bit samples are scaled to 8 bits.
fn decode_tiff_page<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    path: &Path,
    page_idx: usize,
) -> Result<DynamicImage> {
    let context = || format!("failed to decode page {} of {:?}", page_idx + 1, path.display());
    let (width, height) = decoder.dimensions().with_context(context)?;
    let color_type = decoder.colortype().with_context(context)?;
    let samples = match decoder.read_image().with_context(context)? {
        DecodingResult::U8(data) => data,
        DecodingResult::U16(data) => data.iter().map(|&v| (v >> 8) as u8).collect(),
        _ => return Err(anyhow!("unsupported TIFF sample format").context(context())),
    };

    let image = match color_type {
        ColorType::Gray(8 | 16) => {
            GrayImage::from_raw(width, height, samples).map(DynamicImage::ImageLuma8)
        }
        ColorType::RGB(8 | 16) => {
            RgbImage::from_raw(width, height, samples).map(DynamicImage::ImageRgb8)
        }
        ColorType::RGBA(8 | 16) => {
            RgbaImage::from_raw(width, height, samples).map(DynamicImage::ImageRgba8)
        }
        other => {
            return Err(anyhow!("unsupported TIFF color type {:?}", other).context(context()));
        }
    };
    image.ok_or_else(|| anyhow!("TIFF pixel data doesn't match its dimensions").context(context()))
}
