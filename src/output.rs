//! Terminal progress rendering for transfers.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use resumable_core::{Notifier, Status, WorkerError};

const BAR_TEMPLATE: &str =
    "{msg:>9} [{bar:30.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec} ETA {eta} {prefix}";
const SPINNER_TEMPLATE: &str = "{spinner} {msg:>9} {bytes} {bytes_per_sec} {prefix}";

/// Renders one transfer's notifications as an indicatif progress bar.
///
/// Starts as a spinner and becomes a bar once the server announces a total
/// size.
pub(crate) struct ProgressNotifier {
    bar: ProgressBar,
}

impl ProgressNotifier {
    /// Progress line labelled with `label`, drawn on stdout unless `visible`
    /// is false.
    pub(crate) fn new(label: impl Into<String>, visible: bool) -> Self {
        let target = if visible {
            ProgressDrawTarget::stdout()
        } else {
            ProgressDrawTarget::hidden()
        };
        let bar = ProgressBar::with_draw_target(None, target);
        bar.set_style(spinner_style());
        bar.set_prefix(label.into());
        Self { bar }
    }

    fn update(&self, status: Status, offset: u64, size: Option<u64>) {
        if let Some(total) = size
            && self.bar.length() != Some(total)
        {
            self.bar.set_length(total);
            self.bar.set_style(bar_style());
        }
        self.bar.set_position(offset);
        if self.bar.message() != status.as_str() {
            self.bar.set_message(status.as_str());
        }
    }
}

impl Notifier for ProgressNotifier {
    fn notify(&self, status: Status, error: Option<&WorkerError>, offset: u64, size: Option<u64>) {
        match status {
            Status::Idle => {}
            Status::Work | Status::Download => self.update(status, offset, size),
            Status::Exists | Status::Completed => {
                self.update(status, offset, size);
                self.bar.finish();
            }
            Status::Error => {
                let detail = error.map(ToString::to_string).unwrap_or_default();
                self.bar.abandon_with_message(format!("Error: {detail}"));
            }
        }
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template(SPINNER_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}
