use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::session::{SessionStatus, StatusSnapshot};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

impl UiMode {
    pub fn from_flag(flag: Option<&str>) -> Self {
        match flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        }
    }
}

/// Renders session snapshots on stderr.
///
/// Pretty mode draws a bar when the total is known and a spinner otherwise.
/// Plain mode prints a `==>` line whenever the status line changes.
pub struct ProgressView {
    bar: Option<ProgressBar>,
    last_line: Option<String>,
    started: Instant,
    pretty: bool,
}

impl ProgressView {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        let pretty = is_tty
            && match mode {
                UiMode::Pretty | UiMode::Auto => true,
                UiMode::Plain => false,
            };
        Self {
            bar: None,
            last_line: None,
            started: Instant::now(),
            pretty,
        }
    }

    pub fn is_pretty(&self) -> bool {
        self.pretty
    }

    pub fn update(&mut self, snapshot: &StatusSnapshot) {
        let line = status_line(snapshot);
        if self.pretty {
            let bar = self
                .bar
                .get_or_insert_with(|| new_bar(snapshot.total_frames));
            bar.set_position(snapshot.frames_processed);
            bar.set_message(line);
            return;
        }
        if self.last_line.as_deref() != Some(line.as_str()) {
            eprintln!("==> {}", line);
            self.last_line = Some(line);
        }
    }

    /// Final line with elapsed time.
    pub fn finish(&mut self, message: &str) {
        let message = format!("✔ {} ({})", message, format_duration(self.started.elapsed()));
        match self.bar.take() {
            Some(bar) => bar.finish_with_message(message),
            None => eprintln!("{message}"),
        }
    }
}

fn new_bar(total: Option<u64>) -> ProgressBar {
    let bar = match total {
        Some(total) => {
            let bar = ProgressBar::new(total);
            let style = ProgressStyle::with_template("{bar:30} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar
        }
        None => {
            let spinner = ProgressBar::new_spinner();
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {pos} frames {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner
        }
    };
    bar.set_draw_target(ProgressDrawTarget::stderr());
    bar
}

/// One-line summary of a snapshot. Frame counts are left to the bar.
pub fn status_line(snapshot: &StatusSnapshot) -> String {
    let status = match snapshot.status {
        SessionStatus::Idle => "idle",
        SessionStatus::Running => "running",
        SessionStatus::Error => "error",
    };
    let mut line = format!("[{}] {}", status, snapshot.last_event_label);
    if snapshot.captures > 0 {
        line.push_str(&format!(" | captures {}", snapshot.captures));
    }
    if snapshot.notified {
        line.push_str(" | alert sent");
    }
    if let Some(error) = &snapshot.error {
        line.push_str(&format!(" | {}", error));
    }
    line
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_line_mentions_captures_and_alert() {
        let mut snapshot = StatusSnapshot::default();
        assert_eq!(status_line(&snapshot), "[idle] No Accident Reported");

        snapshot.status = SessionStatus::Running;
        snapshot.last_event_label = "accident".to_string();
        snapshot.captures = 2;
        snapshot.notified = true;
        assert_eq!(
            status_line(&snapshot),
            "[running] accident | captures 2 | alert sent"
        );
    }

    #[test]
    fn plain_mode_never_draws_bars() {
        let mut view = ProgressView::new(UiMode::Plain, true);
        assert!(!view.is_pretty());
        view.update(&StatusSnapshot::default());
        assert!(view.bar.is_none());
        assert!(!ProgressView::new(UiMode::Pretty, false).is_pretty());
    }

    #[test]
    fn durations_switch_units_at_one_second() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }
}
