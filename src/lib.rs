//! IDIFF - container image diff tool.
//!
//! This library compares two container images without running them: their
//! build history, their filesystems and their installed packages (pip, node,
//! apt, apk). Images can come from the local daemon, a registry or a saved
//! tar archive.
//!
//! # Example
//!
//! ```no_run
//! use idiff_rs::{diff_images, format_report, DiffRequest, OutputFormat, OutputOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let request = DiffRequest::new("base.tar", "app.tar", vec!["history".into(), "pip".into()]);
//! let report = diff_images(request).await?;
//!
//! let output = format_report(&report, &OutputFormat::Terminal, &OutputOptions::default())?;
//! println!("{}", output);
//! # Ok(())
//! # }
//! ```

pub mod acquire;
pub mod archive;
pub mod config;
pub mod diff;
pub mod differs;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod image;
pub mod matcher;
pub mod output;
pub mod source;

// Re-export commonly used types for convenience
pub use acquire::{acquire, AcquireOptions, BackendPreference};
pub use diff::{DiffResult, DiffStats};
pub use differs::{DiffOptions, DifferKind, WalkDepth};
pub use dispatch::{run_differs, DiffReport};
pub use error::{AcquireError, ConfigError, DifferError, IdiffError, OutputError};
pub use image::{Diagnostic, Image};
pub use output::{format_report, OutputFormat, OutputOptions};

/// Differs run when none are requested.
pub const DEFAULT_DIFFERS: [&str; 1] = ["history"];

/// Everything needed to compare two images.
#[derive(Debug, Clone)]
pub struct DiffRequest {
    pub image1: String,
    pub image2: String,
    /// Differ keys, resolved against [`differs::DIFFER_KEYS`]
    pub differs: Vec<String>,
    pub acquire: AcquireOptions,
    pub diff: DiffOptions,
}

impl DiffRequest {
    pub fn new(image1: impl Into<String>, image2: impl Into<String>, differs: Vec<String>) -> Self {
        Self {
            image1: image1.into(),
            image2: image2.into(),
            differs,
            acquire: AcquireOptions::default(),
            diff: DiffOptions::default(),
        }
    }
}

/// Acquires both images concurrently and runs the requested differs.
///
/// Any acquisition failure aborts the request. The acquired images, and
/// their temporary directories, are dropped before this returns.
pub async fn diff_images(request: DiffRequest) -> Result<DiffReport, IdiffError> {
    let (image1, image2) = tokio::try_join!(
        acquire(&request.image1, &request.acquire),
        acquire(&request.image2, &request.acquire),
    )?;

    let DiffRequest { differs, diff, .. } = request;
    tokio::task::spawn_blocking(move || run_differs(&image1, &image2, &differs, &diff))
        .await
        .map_err(|e| IdiffError::TaskFailed(e.to_string()))?
}
