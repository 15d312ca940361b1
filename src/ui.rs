//! Terminal output: page progress bars, status lines and a log writer that
//! doesn't garble them.

use std::{io, sync::Arc, time::Duration};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressFinish, ProgressStyle};

/// Template for page progress bars.
const PAGE_PROGRESS_TEMPLATE: &str =
    "  {prefix:3}{msg:18} {pos:>4}/{len:4} pages {elapsed_precise} {wide_bar:.cyan/blue} {eta_precise}";

/// Shared handle on everything we draw on stderr.
#[derive(Clone)]
pub struct Ui {
    bars: Arc<MultiProgress>,
}

impl Ui {
    /// Draw to stderr.
    pub fn init() -> Ui {
        Ui {
            bars: Arc::new(MultiProgress::new()),
        }
    }

    /// Draw nothing. Used by tests.
    #[cfg(test)]
    pub fn init_for_tests() -> Ui {
        Ui {
            bars: Arc::new(MultiProgress::with_draw_target(ProgressDrawTarget::hidden())),
        }
    }

    /// Stop drawing progress bars, because stdout carries our JSON.
    pub fn hide_progress_bars(&self) {
        self.bars.set_draw_target(ProgressDrawTarget::hidden());
    }

    /// A writer for `tracing` that suspends progress bars while logging.
    pub fn stderr_writer(&self) -> StderrWriter {
        StderrWriter { ui: self.clone() }
    }

    /// A progress bar counting recognized pages of one document.
    pub fn page_progress(&self, document: &str, pages: usize) -> ProgressBar {
        let style = ProgressStyle::default_bar()
            .template(PAGE_PROGRESS_TEMPLATE)
            .expect("page progress template should be valid");
        let pb = self.bars.add(ProgressBar::new(pages as u64).with_style(style));
        #[cfg(test)]
        pb.set_draw_target(ProgressDrawTarget::hidden());
        pb.set_prefix("📄");
        pb.set_message(document.to_owned());
        pb.enable_steady_tick(Duration::from_millis(250));
        pb.with_finish(ProgressFinish::AndLeave)
    }

    /// Print one status line, prefixed with an emoji.
    pub fn notice(&self, emoji: &str, msg: &str) {
        let line = format!("{emoji} {msg}");
        if self.bars.println(&line).is_err() {
            eprintln!("{line}");
        }
    }
}

/// Writes to stderr with progress bars suspended.
#[derive(Clone)]
pub struct StderrWriter {
    ui: Ui,
}

impl io::Write for StderrWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ui.bars.suspend(|| io::stderr().write(buf))
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.ui.bars.suspend(|| io::stderr().write_all(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.ui.bars.suspend(|| io::stderr().flush())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for StderrWriter {
    type Writer = StderrWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
