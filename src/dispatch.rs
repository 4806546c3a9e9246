//! Runs the requested differs against an acquired image pair.

use crate::diff::{DiffResult, DiffStats};
use crate::differs::{DiffOptions, DifferKind};
use crate::error::{DifferError, IdiffError};
use crate::image::Image;
use serde::Serialize;
use std::collections::BTreeMap;
use std::thread;
use tracing::{debug, error, warn};

/// Results of one comparison.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiffReport {
    pub results: BTreeMap<DifferKind, DiffResult>,
    /// Requested keys that matched no differ
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
    /// `kind: error` for every differ that failed
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
}

impl DiffReport {
    /// Combined statistics of every result.
    pub fn stats(&self) -> DiffStats {
        let mut stats = DiffStats::default();
        for result in self.results.values() {
            stats += result.stats();
        }
        stats
    }

    /// Returns true if no differ found a difference.
    pub fn is_empty(&self) -> bool {
        self.results.values().all(DiffResult::is_empty)
    }
}

/// Resolves differ keys, dropping duplicates. Unknown keys are returned
/// separately.
pub fn resolve_differs<S: AsRef<str>>(keys: &[S]) -> (Vec<DifferKind>, Vec<String>) {
    let mut kinds = Vec::new();
    let mut skipped = Vec::new();

    for key in keys {
        let key = key.as_ref();
        match DifferKind::from_key(key) {
            Some(kind) if !kinds.contains(&kind) => kinds.push(kind),
            Some(kind) => debug!(key, %kind, "Differ already requested"),
            None => {
                warn!(key, "Unknown differ");
                skipped.push(key.to_string());
            }
        }
    }

    (kinds, skipped)
}

/// Runs each requested differ on its own thread.
///
/// A failing or panicking differ is logged and recorded in
/// [`DiffReport::failures`]; the others are unaffected. Fails with
/// [`IdiffError::NoResults`] only when nothing succeeded.
pub fn run_differs<S: AsRef<str>>(
    image1: &Image,
    image2: &Image,
    keys: &[S],
    options: &DiffOptions,
) -> Result<DiffReport, IdiffError> {
    let (kinds, skipped) = resolve_differs(keys);

    let outcomes: Vec<(DifferKind, Result<DiffResult, DifferError>)> = thread::scope(|scope| {
        let handles: Vec<_> = kinds
            .iter()
            .map(|&kind| (kind, scope.spawn(move || kind.run(image1, image2, options))))
            .collect();

        handles
            .into_iter()
            .map(|(kind, handle)| {
                let outcome = handle.join().unwrap_or_else(|_| {
                    Err(DifferError::Panicked {
                        kind: kind.to_string(),
                    })
                });
                (kind, outcome)
            })
            .collect()
    });

    let mut report = DiffReport {
        skipped,
        ..Default::default()
    };
    for (kind, outcome) in outcomes {
        match outcome {
            Ok(result) => {
                debug!(%kind, changes = result.stats().total_changes(), "Differ finished");
                report.results.insert(kind, result);
            }
            Err(e) => {
                error!(%kind, error = %e, "Differ failed");
                report.failures.push(format!("{}: {}", kind, e));
            }
        }
    }

    if report.results.is_empty() {
        return Err(IdiffError::NoResults {
            failures: report.failures,
            skipped: report.skipped,
        });
    }
    Ok(report)
}
