use crate::engine::{CompressionAttempt, QualityPreset};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Observer for ladder progress. Purely informational.
pub trait Progress {
    fn attempt_started(&mut self, index: usize, total: usize, preset: QualityPreset);
    /// Called once the attempt's artifact has been kept or discarded.
    fn attempt_finished(&mut self, attempt: &CompressionAttempt);
    fn finish(&mut self);
}

pub struct NoProgress;

impl Progress for NoProgress {
    fn attempt_started(&mut self, _: usize, _: usize, _: QualityPreset) {}
    fn attempt_finished(&mut self, _: &CompressionAttempt) {}
    fn finish(&mut self) {}
}

/// In-place terminal bar on stderr, one step per preset.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(total: usize) -> Self {
        let bar = ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr());
        let style = ProgressStyle::with_template("[{bar:40}] {percent:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█░");
        bar.set_style(style);
        Self { bar }
    }
}

impl Progress for BarProgress {
    fn attempt_started(&mut self, index: usize, _total: usize, preset: QualityPreset) {
        // Position counts the attempt in flight, matching index/total.
        self.bar.set_position(index as u64);
        self.bar.set_message(format!("compressing at '{preset}'"));
    }

    fn attempt_finished(&mut self, attempt: &CompressionAttempt) {
        if !attempt.succeeded() {
            self.bar
                .set_message(format!("'{}' failed", attempt.preset));
        }
    }

    fn finish(&mut self) {
        self.bar.finish_and_clear();
    }
}
