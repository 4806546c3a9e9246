//! Output formatting for diff reports.
//!
//! Structured formats (JSON, YAML) serialize the [`DiffReport`] directly;
//! their key order is fixed by the ordered maps in the report. Narrative
//! formats (terminal, plain) render every result with the template for its
//! [`DiffResult`] variant.
//!
//! # Examples
//!
//! ```
//! use idiff_rs::diff::{DiffResult, HistoryDiff};
//! use idiff_rs::differs::DifferKind;
//! use idiff_rs::dispatch::DiffReport;
//! use idiff_rs::output::{format_report, OutputFormat, OutputOptions};
//!
//! let mut report = DiffReport::default();
//! report.results.insert(
//!     DifferKind::History,
//!     DiffResult::History(HistoryDiff {
//!         image1: "base.tar".to_string(),
//!         image2: "app.tar".to_string(),
//!         additions: vec!["RUN b".to_string()],
//!         deletions: vec!["RUN a".to_string()],
//!     }),
//! );
//!
//! let output = format_report(&report, &OutputFormat::Plain, &OutputOptions::default()).unwrap();
//! assert!(output.contains("+ RUN b"));
//! assert!(output.contains("- RUN a"));
//! ```

use crate::diff::{
    DiffResult, DiffStats, FileMeta, FileSystemDiff, HistoryDiff, NamespacedInfo, PackageDiff,
    PackageInfo,
};
use crate::dispatch::DiffReport;
use crate::error::OutputError;
use bytesize::ByteSize;
use colored::*;
use serde::Deserialize;
use std::str::FromStr;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Colored terminal output with ANSI escape codes
    Terminal,
    /// Pretty-printed JSON
    Json,
    Yaml,
    /// Plain text, no colors (suitable for piping)
    Plain,
}

impl FromStr for OutputFormat {
    type Err = OutputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "terminal" => Ok(OutputFormat::Terminal),
            "json" => Ok(OutputFormat::Json),
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            "plain" => Ok(OutputFormat::Plain),
            _ => Err(OutputError::UnknownFormat {
                format: s.to_string(),
            }),
        }
    }
}

/// Options for narrative output.
#[derive(Debug, Clone)]
pub struct OutputOptions {
    /// Append the `Summary:` line
    pub summary: bool,
    /// Print sizes in human units instead of raw byte counts
    pub human_sizes: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            summary: true,
            human_sizes: true,
        }
    }
}

/// Formats a report according to the specified format and options.
///
/// # Arguments
///
/// * `report` - The report to format
/// * `format` - The output format
/// * `options` - Formatting options (narrative formats only)
///
/// # Returns
///
/// Returns the formatted string on success, or an OutputError on failure.
pub fn format_report(
    report: &DiffReport,
    format: &OutputFormat,
    options: &OutputOptions,
) -> Result<String, OutputError> {
    match format {
        OutputFormat::Terminal => Ok(Narrative::new(Style::Colored, options).render(report)),
        OutputFormat::Plain => Ok(Narrative::new(Style::Plain, options).render(report)),
        OutputFormat::Json => serde_json::to_string_pretty(report)
            .map_err(|e| OutputError::JsonSerializationError { source: e }),
        OutputFormat::Yaml => serde_yaml::to_string(report)
            .map_err(|e| OutputError::YamlSerializationError { source: e }),
    }
}

/// Color scheme:
/// - Added: green (bright_green for symbols)
/// - Removed: red (bright_red for symbols)
/// - Modified: yellow (bright_yellow for symbols)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Colored,
    Plain,
}

impl Style {
    fn added(self, text: &str) -> String {
        match self {
            Style::Colored => format!("{} {}", "+".bright_green(), text.green()),
            Style::Plain => format!("+ {}", text),
        }
    }

    fn removed(self, text: &str) -> String {
        match self {
            Style::Colored => format!("{} {}", "-".bright_red(), text.red()),
            Style::Plain => format!("- {}", text),
        }
    }

    fn modified(self, text: &str) -> String {
        match self {
            Style::Colored => format!("{} {}", "•".bright_yellow(), text.yellow()),
            Style::Plain => format!("• {}", text),
        }
    }

    fn heading(self, text: &str) -> String {
        match self {
            Style::Colored => text.bold().to_string(),
            Style::Plain => text.to_string(),
        }
    }

    fn note(self, text: &str) -> String {
        match self {
            Style::Colored => text.dimmed().to_string(),
            Style::Plain => text.to_string(),
        }
    }
}

struct Narrative<'a> {
    style: Style,
    options: &'a OutputOptions,
    lines: Vec<String>,
}

impl<'a> Narrative<'a> {
    fn new(style: Style, options: &'a OutputOptions) -> Self {
        Self {
            style,
            options,
            lines: Vec::new(),
        }
    }

    fn render(mut self, report: &DiffReport) -> String {
        for result in report.results.values() {
            if !self.lines.is_empty() {
                self.lines.push(String::new());
            }
            match result {
                DiffResult::History(diff) => self.history(diff),
                DiffResult::Package(diff) => self.package(diff),
                DiffResult::FileSystem(diff) => self.filesystem(diff),
            }
        }

        for key in &report.skipped {
            let line = self.style.note(&format!("Skipped unknown differ: {}", key));
            self.lines.push(line);
        }
        for failure in &report.failures {
            let line = self.style.note(&format!("Differ failed: {}", failure));
            self.lines.push(line);
        }

        if self.options.summary {
            self.lines.push(String::new());
            self.lines.push(format_summary(&report.stats()));
        }

        self.lines.join("\n")
    }

    fn push_heading(&mut self, text: String) {
        let line = self.style.heading(&text);
        self.lines.push(line);
    }

    fn push_none(&mut self) {
        let line = self.style.note("No changes detected.");
        self.lines.push(line);
    }

    fn history(&mut self, diff: &HistoryDiff) {
        let HistoryDiff {
            image1,
            image2,
            additions,
            deletions,
        } = diff;

        self.push_heading(format!("History diff between {} and {}:", image1, image2));
        if additions.is_empty() && deletions.is_empty() {
            self.push_none();
            return;
        }
        for line in deletions {
            self.lines.push(self.style.removed(line));
        }
        for line in additions {
            self.lines.push(self.style.added(line));
        }
    }

    fn package(&mut self, diff: &PackageDiff) {
        let PackageDiff {
            manager,
            image1,
            image2,
            only_in_1,
            only_in_2,
            differing,
        } = diff;

        self.push_heading(format!("{} package diff between {} and {}:", manager, image1, image2));
        if only_in_1.is_empty() && only_in_2.is_empty() && differing.is_empty() {
            self.push_none();
            return;
        }

        if !only_in_1.is_empty() {
            self.push_heading(format!("Packages found only in {}:", image1));
            for (name, entries) in only_in_1 {
                let text = format!("{} {}", name, self.namespaces(entries));
                self.lines.push(self.style.removed(&text));
            }
        }
        if !only_in_2.is_empty() {
            self.push_heading(format!("Packages found only in {}:", image2));
            for (name, entries) in only_in_2 {
                let text = format!("{} {}", name, self.namespaces(entries));
                self.lines.push(self.style.added(&text));
            }
        }
        if !differing.is_empty() {
            self.push_heading("Version differences:".to_string());
            for (name, change) in differing {
                self.lines.push(self.style.modified(name));
                let namespaces = change.image1.keys().chain(change.image2.keys());
                let mut seen = Vec::new();
                for namespace in namespaces {
                    if seen.contains(&namespace) {
                        continue;
                    }
                    seen.push(namespace);
                    let line = format!(
                        "    {}: {} → {}",
                        namespace,
                        self.package_info(change.image1.get(namespace)),
                        self.package_info(change.image2.get(namespace)),
                    );
                    self.lines.push(line);
                }
            }
        }
    }

    fn filesystem(&mut self, diff: &FileSystemDiff) {
        let FileSystemDiff {
            image1,
            image2,
            only_in_1,
            only_in_2,
            changed,
        } = diff;

        self.push_heading(format!("Filesystem diff between {} and {}:", image1, image2));
        if only_in_1.is_empty() && only_in_2.is_empty() && changed.is_empty() {
            self.push_none();
            return;
        }

        if !only_in_1.is_empty() {
            self.push_heading(format!("Only in {}:", image1));
            for path in only_in_1 {
                self.lines.push(self.style.removed(path));
            }
        }
        if !only_in_2.is_empty() {
            self.push_heading(format!("Only in {}:", image2));
            for path in only_in_2 {
                self.lines.push(self.style.added(path));
            }
        }
        if !changed.is_empty() {
            self.push_heading("Changed:".to_string());
            for change in changed {
                let text = format!(
                    "{}: {} → {}",
                    change.path,
                    self.file_meta(&change.image1),
                    self.file_meta(&change.image2)
                );
                self.lines.push(self.style.modified(&text));
            }
        }
    }

    fn size(&self, bytes: u64) -> String {
        if self.options.human_sizes {
            ByteSize(bytes).to_string()
        } else {
            bytes.to_string()
        }
    }

    fn package_info(&self, info: Option<&PackageInfo>) -> String {
        let Some(info) = info else {
            return "(none)".to_string();
        };
        let version = info.version.as_deref().unwrap_or("unknown");
        match info.size {
            Some(size) => format!("{} ({})", version, self.size(size)),
            None => version.to_string(),
        }
    }

    fn namespaces(&self, entries: &NamespacedInfo) -> String {
        let parts: Vec<String> = entries
            .iter()
            .map(|(namespace, info)| format!("{}: {}", namespace, self.package_info(Some(info))))
            .collect();
        format!("[{}]", parts.join(", "))
    }

    fn file_meta(&self, meta: &FileMeta) -> String {
        if meta.is_dir {
            format!("dir {:o}", meta.mode)
        } else {
            format!("{} {:o}", self.size(meta.size), meta.mode)
        }
    }
}

/// Formats summary statistics.
fn format_summary(stats: &DiffStats) -> String {
    if stats.is_empty() {
        return "Summary: No changes".to_string();
    }

    let mut parts = Vec::new();
    if stats.added > 0 {
        parts.push(format!("{} added", stats.added));
    }
    if stats.removed > 0 {
        parts.push(format!("{} removed", stats.removed));
    }
    if stats.modified > 0 {
        parts.push(format!("{} modified", stats.modified));
    }

    format!("Summary: {}", parts.join(", "))
}
