//! OCR settings shared by the page loader, preprocessor and OCR engine.

use clap::Args;

use crate::{preprocess::ThresholdMethod, prelude::*};

/// How to rasterize, clean up and recognize pages.
#[derive(Args, Clone, Debug)]
pub struct OcrConfig {
    /// Path to the `tesseract` executable.
    #[clap(long, env = "TESSERACT_CMD", default_value = "tesseract")]
    pub tesseract_cmd: PathBuf,

    /// Directory containing Poppler's `pdfinfo` and `pdftocairo`. Uses
    /// `PATH` if not set.
    #[clap(long, env = "POPPLER_PATH")]
    pub poppler_path: Option<PathBuf>,

    /// Resolution for rasterizing PDF pages.
    #[clap(long, default_value = "300")]
    pub pdf_dpi: u32,

    /// Tesseract languages, joined with `+`.
    #[clap(long, env = "OCR_LANG", default_value = "vie+eng")]
    pub ocr_lang: String,

    /// Tesseract page segmentation mode. 6 assumes one uniform block of text.
    #[clap(long, default_value = "6")]
    pub ocr_psm: u8,

    /// Tesseract OCR engine mode. 3 uses the default engine.
    #[clap(long, default_value = "3")]
    pub ocr_oem: u8,

    /// How to binarize pages before OCR.
    #[clap(long, value_enum, default_value_t = ThresholdMethod::Otsu)]
    pub threshold: ThresholdMethod,

    /// Process at most this many pages. The output is marked incomplete if
    /// the document has more.
    #[clap(long)]
    pub max_pages: Option<usize>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_cmd: PathBuf::from("tesseract"),
            poppler_path: None,
            pdf_dpi: 300,
            ocr_lang: "vie+eng".to_owned(),
            ocr_psm: 6,
            ocr_oem: 3,
            threshold: ThresholdMethod::Otsu,
            max_pages: None,
        }
    }
}

impl OcrConfig {
    /// The command to run for a Poppler tool.
    pub fn poppler_command(&self, tool: &str) -> PathBuf {
        match &self.poppler_path {
            Some(dir) => dir.join(tool),
            None => PathBuf::from(tool),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Debug, Parser)]
    struct TestOpts {
        #[clap(flatten)]
        config: OcrConfig,
    }

    #[test]
    fn clap_defaults_match_default_impl() {
        // Environment variables could leak in here, so only check the rest.
        let parsed = TestOpts::parse_from(["test"]).config;
        let default = OcrConfig::default();
        assert_eq!(parsed.pdf_dpi, default.pdf_dpi);
        assert_eq!(parsed.ocr_psm, default.ocr_psm);
        assert_eq!(parsed.ocr_oem, default.ocr_oem);
        assert_eq!(parsed.threshold, default.threshold);
        assert_eq!(parsed.max_pages, None);
    }

    #[test]
    fn poppler_command_uses_configured_directory() {
        let mut config = OcrConfig::default();
        assert_eq!(config.poppler_command("pdfinfo"), PathBuf::from("pdfinfo"));
        config.poppler_path = Some(PathBuf::from("/opt/poppler/bin"));
        assert_eq!(
            config.poppler_command("pdftocairo"),
            PathBuf::from("/opt/poppler/bin/pdftocairo")
        );
    }
}
