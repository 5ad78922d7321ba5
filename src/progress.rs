//! Run progress display with an explicit idle, running, closed lifecycle.
//!
//! The caller owns the context and passes it to whoever reports progress;
//! `RunningProgress::tick` takes `&self` so worker threads can share it.

use indicatif::{ProgressBar, ProgressStyle};

const TEMPLATE: &str = "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}";

/// Not yet started.
#[derive(Debug, Clone)]
pub struct Progress {
    enabled: bool,
    label: String,
}

/// Counting completed tasks.
#[derive(Debug)]
pub struct RunningProgress {
    bar: ProgressBar,
}

/// Finished; only the final count remains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosedProgress {
    pub completed: u64,
}

impl Progress {
    pub fn new(enabled: bool, label: impl Into<String>) -> Self {
        Self {
            enabled,
            label: label.into(),
        }
    }

    pub fn start(self, total: usize) -> RunningProgress {
        let bar = if self.enabled {
            let bar = ProgressBar::new(total as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template(TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("█▉▊▋▌▍▎▏ "),
            );
            bar
        } else {
            ProgressBar::hidden()
        };
        bar.set_length(total as u64);
        bar.set_message(self.label);
        RunningProgress { bar }
    }
}

impl RunningProgress {
    pub fn tick(&self) {
        self.bar.inc(1);
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(self) -> ClosedProgress {
        let completed = self.bar.position();
        self.bar.finish_and_clear();
        ClosedProgress { completed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_progress_still_counts() {
        let running = Progress::new(false, "inspecting").start(3);
        running.tick();
        running.tick();
        assert_eq!(running.position(), 2);
        assert_eq!(running.finish(), ClosedProgress { completed: 2 });
    }
}
