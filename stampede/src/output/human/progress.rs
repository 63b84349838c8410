use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// One bar spanning the arrival window. Users still draining after the window keep the
/// message ticking at 100%.
pub(crate) struct HumanProgress {
    pb: ProgressBar,
}

impl HumanProgress {
    pub(crate) fn new(window: Duration) -> Self {
        let pb = ProgressBar::with_draw_target(
            Some(window.as_millis() as u64),
            ProgressDrawTarget::stderr_with_hz(5),
        );
        pb.set_style(bar_style());
        Self { pb }
    }

    pub(crate) fn update(&self, elapsed: Duration, message: String) {
        let total_ms = self.pb.length().unwrap_or(0);
        self.pb.set_message(message);
        self.pb.set_position((elapsed.as_millis() as u64).min(total_ms));
    }

    pub(crate) fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("[ {bar:20.cyan/blue} ] {percent:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█░")
}
