//! Application related stuff

use indicatif::{ProgressBar, ProgressStyle};

/// Create a progress reporter for long running work.
///
/// * `len` - Total number of steps.
pub fn create_progress_reporter(len: u64) -> ProgressBar {
    let progress = ProgressBar::new(len);
    progress.set_style(
        ProgressStyle::with_template("{msg:<20} [{elapsed_precise}] {wide_bar} {pos}/{len} ({eta})")
            .unwrap(),
    );
    progress
}
