//! Terminal output — spinner and colored messages.
//!
//! Uses `indicatif` for the progress spinner and `console` for color
//! styling. [`SendProgress`] tracks a submission visually; notifications
//! from the pipeline print above the spinner without breaking it.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use courier::OperationResult;
use courier::operation::OperationRecord;
use courier::pipeline::DebugInfo;
use courier::pipeline::history::PipelineMetrics;
use courier::pipeline::notify::{Notification, Severity};

/// Visual progress for one submission (or one batch).
///
/// Shows an animated spinner while the operation is in flight, yellow
/// retry lines as they happen and a green/red terminal line at the end.
#[derive(Clone)]
pub struct SendProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl SendProgress {
    pub fn start(name: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .expect("invalid template"),
        );
        pb.set_message(format!("SEND: {name}"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Print one pipeline notification above the spinner.
    pub fn note(&self, notification: &Notification) {
        let line = match notification.severity {
            Severity::Info => return,
            Severity::Warning => format!(
                "  {} {}",
                self.yellow.apply_to("↻"),
                notification.message
            ),
            Severity::Error => format!("  {} {}", self.red.apply_to("✗"), notification.message),
        };
        self.pb.println(line);
    }

    /// Finish the spinner and print the terminal outcome.
    pub fn complete(&self, result: &OperationResult) {
        self.pb.finish_and_clear();
        match result {
            Ok(data) => {
                println!("  {} Done", self.green.apply_to("✓"));
                if !data.is_null() {
                    println!("{}", serde_json::to_string_pretty(data).unwrap_or_default());
                }
            }
            Err(err) => {
                println!("  {} {}", self.red.apply_to("✗"), err.user_message());
            }
        }
    }

    /// Finish the spinner with a batch summary line.
    pub fn finish_batch(&self, succeeded: usize, failed: usize) {
        self.pb.finish_and_clear();
        if failed == 0 {
            println!(
                "  {} Batch complete: {succeeded} succeeded",
                self.green.apply_to("✓")
            );
        } else {
            println!(
                "  {} Batch complete: {succeeded} succeeded, {failed} failed",
                self.red.apply_to("✗")
            );
        }
    }
}

/// Print the `status` view: metrics, breaker states and recent history.
pub fn print_status(info: &DebugInfo, metrics: &PipelineMetrics, history: &[OperationRecord]) {
    let header = Style::new().cyan().bold();

    println!("{}", header.apply_to("─── Pipeline ───"));
    println!(
        "queued {:?}  active {}  open batches {}",
        info.lane_depths, info.active, info.open_batches
    );
    println!(
        "{}",
        serde_json::to_string_pretty(metrics).unwrap_or_default()
    );

    println!("{}", header.apply_to("─── Breakers ───"));
    if info.breakers.is_empty() {
        println!("(no circuits yet)");
    } else {
        for (name, breaker) in &info.breakers {
            println!(
                "{name}: {} ({} ok / {} failed of {})",
                breaker.state, breaker.successes, breaker.failures, breaker.total
            );
        }
    }

    println!("{}", header.apply_to("─── History ───"));
    if history.is_empty() {
        println!("(empty)");
    }
    for record in history {
        let mark = if record.success { "✓" } else { "✗" };
        println!(
            "{mark} {} [{}] attempts={} {}ms{}",
            record.name,
            record.priority,
            record.attempts,
            record.duration_ms,
            record
                .error
                .as_deref()
                .map(|e| format!(" ({e})"))
                .unwrap_or_default()
        );
    }
}
