//! Terminal output for checkout and update
//!
//! Progress lines get a colored marker. `status` prints its lines verbatim
//! and never goes through here. Failures go to stderr.

use colored::{ColoredString, Colorize};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::core::report::SubmoduleReport;

const SPINNER_TICKS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Marker printed in front of a progress line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Done,
    Failed,
    Attention,
    Note,
}

impl Marker {
    fn symbol(self) -> ColoredString {
        match self {
            Marker::Done => "✓".green(),
            Marker::Failed => "✗".red(),
            Marker::Attention => "⚠".yellow(),
            Marker::Note => "ℹ".blue(),
        }
    }

    /// Marker for one reconciled submodule
    pub fn for_report(report: &SubmoduleReport) -> Self {
        match report {
            SubmoduleReport::Created { .. }
            | SubmoduleReport::Updated { .. }
            | SubmoduleReport::UpToDate { .. } => Marker::Done,
            SubmoduleReport::Skipped { .. } => Marker::Note,
            SubmoduleReport::Deferred { .. } => Marker::Attention,
            SubmoduleReport::Failed { .. } => Marker::Failed,
        }
    }
}

pub struct Output;

impl Output {
    pub fn line(marker: Marker, message: &str) {
        match marker {
            Marker::Failed => eprintln!("{} {}", marker.symbol(), message),
            _ => println!("{} {}", marker.symbol(), message),
        }
    }

    pub fn success(message: &str) {
        Self::line(Marker::Done, message);
    }

    pub fn error(message: &str) {
        Self::line(Marker::Failed, message);
    }

    pub fn warning(message: &str) {
        Self::line(Marker::Attention, message);
    }

    pub fn info(message: &str) {
        Self::line(Marker::Note, message);
    }

    /// Bold title, preceded by a blank line
    pub fn header(title: &str) {
        println!("\n{}", title.bold());
    }

    pub fn report(report: &SubmoduleReport) {
        Self::line(Marker::for_report(report), &report.to_string());
    }

    /// Spinner shown while git runs. Print through `ProgressBar::suspend`
    /// while it is active.
    pub fn spinner(message: &str) -> ProgressBar {
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("hardcoded template must be valid")
            .tick_chars(SPINNER_TICKS);
        let spinner = ProgressBar::new_spinner()
            .with_style(style)
            .with_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner
    }

    pub fn submodule_name(name: &str) -> String {
        name.cyan().bold().to_string()
    }
}
