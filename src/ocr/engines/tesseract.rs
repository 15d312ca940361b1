//! Tesseract OCR engine.

use tokio::{fs, process::Command};

use crate::{
    async_utils::check_for_command_failure, config::OcrConfig,
    cpu_limit::with_cpu_semaphore, prelude::*,
};

use super::{OcrPageEngine, OcrPageInput};

/// OCR engine wrapping the `tesseract` CLI tool.
#[derive(Debug)]
pub struct TesseractOcrEngine {
    command: PathBuf,
    lang: String,
    psm: u8,
    oem: u8,
}

impl TesseractOcrEngine {
    /// Create a new `tesseract` engine, checking that the binary runs.
    #[instrument(level = "debug", skip_all, fields(cmd = %config.tesseract_cmd.display()))]
    pub async fn new(config: &OcrConfig) -> Result<Self> {
        let output = Command::new(&config.tesseract_cmd)
            .arg("--version")
            .output()
            .await
            .with_context(|| {
                format!(
                    "cannot run {:?}; install tesseract or set TESSERACT_CMD",
                    config.tesseract_cmd
                )
            })?;
        check_for_command_failure("tesseract", &output, None)?;
        // Older releases print the version on stderr.
        let version = [&output.stdout, &output.stderr]
            .into_iter()
            .flat_map(|bytes| String::from_utf8_lossy(bytes).lines().next().map(str::to_owned))
            .next()
            .unwrap_or_default();
        debug!(%version, lang = %config.ocr_lang, "Using tesseract");

        Ok(Self {
            command: config.tesseract_cmd.clone(),
            lang: config.ocr_lang.clone(),
            psm: config.ocr_psm,
            oem: config.ocr_oem,
        })
    }

    /// Arguments after the input and output paths.
    fn option_args(&self) -> Vec<String> {
        vec![
            "-l".to_owned(),
            self.lang.clone(),
            "--oem".to_owned(),
            self.oem.to_string(),
            "--psm".to_owned(),
            self.psm.to_string(),
        ]
    }
}

#[async_trait]
impl OcrPageEngine for TesseractOcrEngine {
    #[instrument(level = "debug", skip_all, fields(page = input.page_idx + 1))]
    async fn ocr_page(&self, input: OcrPageInput) -> Result<String> {
        let extension = mime_guess::get_mime_extensions_str(&input.page.mime_type)
            .and_then(|exts| exts.first())
            .ok_or_else(|| {
                anyhow!("cannot determine extension for {}", input.page.mime_type)
            })?;

        let tmpdir = tempfile::TempDir::with_prefix("tesseract")?;
        let input_path = tmpdir.path().join(format!("page.{extension}"));
        let output_base = tmpdir.path().join("page");
        fs::write(&input_path, &input.page.data)
            .await
            .context("cannot write tesseract input file")?;

        let output = with_cpu_semaphore(|| async {
            Command::new(&self.command)
                .arg(&input_path)
                .arg(&output_base)
                .args(self.option_args())
                .output()
                .await
                .context("cannot run tesseract")
        })
        .await?;
        check_for_command_failure("tesseract", &output, None)?;

        let text = fs::read_to_string(output_base.with_extension("txt"))
            .await
            .context("cannot read tesseract output file")?;
        trace!(chars = text.len(), "Recognized page");
        Ok(text)
    }
}
