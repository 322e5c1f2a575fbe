//! Terminal output — spinners and colored status lines.
//!
//! Uses `indicatif` for progress spinners and `console` for styling. The
//! worker drives a [`JobProgress`] per job it prints about.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::queue::JobReport;

/// Visual progress indicator for a running job.
pub struct JobProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
}

impl JobProgress {
    pub fn start(job_id: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .expect("invalid template"),
        );
        pb.set_message(format!("job {job_id}: starting"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
        }
    }

    pub fn update(&self, report: &JobReport) {
        self.pb.set_message(format!(
            "job {}: {} ({}%)",
            report.id, report.stage, report.progress_pct
        ));
    }

    pub fn finish(&self, report: &JobReport) {
        match &report.error {
            None => self.pb.finish_with_message(format!(
                "{} job {} completed (${:.4})",
                self.green.apply_to("✓"),
                report.id,
                report.cost_usd
            )),
            Some(err) => self.pb.finish_with_message(format!(
                "{} job {} failed in {}: {}",
                self.red.apply_to("✗"),
                report.id,
                err.stage,
                err.category
            )),
        }
    }
}

/// Print a status report to stdout, colored by outcome.
pub fn print_report(report: &JobReport) {
    let bold = Style::new().bold();
    println!("{} {}", bold.apply_to("job:"), report.id);
    println!("{} {}", bold.apply_to("status:"), report.status);
    println!("{} {}", bold.apply_to("stage:"), report.stage);
    println!("{} {}%", bold.apply_to("progress:"), report.progress_pct);
    println!("{} ${:.4}", bold.apply_to("cost:"), report.cost_usd);
    if let Some(err) = &report.error {
        let red = Style::new().red();
        println!(
            "{} {} ({})",
            bold.apply_to("error:"),
            red.apply_to(&err.message),
            err.category
        );
    }
    if let Some(partial) = &report.partial {
        println!(
            "{} {} top-level codes",
            bold.apply_to("codes:"),
            partial.codes.len()
        );
    }
}
