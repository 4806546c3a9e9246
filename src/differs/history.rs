//! Build-history differ.

use crate::diff::HistoryDiff;
use crate::image::Image;
use crate::matcher;

/// Aligns the two history sequences and reports the unmatched entries.
///
/// Deletions are unique to `image1` and additions unique to `image2`, both
/// in the order the matcher finds them.
pub fn diff(image1: &Image, image2: &Image) -> HistoryDiff {
    HistoryDiff {
        image1: image1.source().to_string(),
        image2: image2.source().to_string(),
        additions: matcher::additions(image1.history(), image2.history()),
        deletions: matcher::deletions(image1.history(), image2.history()),
    }
}
