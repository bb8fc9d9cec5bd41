use std::{
    fs,
    io::Write,
    path::Path,
};

use tempfile::NamedTempFile;

use crate::core::DecksmithError;

pub mod audio;
pub mod image;

pub use audio::AudioFetcher;
pub use image::ImageFetcher;

/// Uniform contract for the remote media strategies. Fetches never raise:
/// every failure is reported to the rate tracker and returned as `false`.
#[allow(async_fn_in_trait)]
pub trait MediaFetcher: Send + Sync {
    /// Generate media for `source` and write it to `output_path`.
    async fn fetch(&self, source: &str, output_path: &Path) -> bool;

    /// Release pooled connections.
    async fn close(&self);
}

/// Write to a temp file in the target directory, then rename into place, so a
/// crash mid-download never leaves a truncated file under the final name.
pub(crate) fn write_atomic(output_path: &Path, bytes: &[u8]) -> Result<(), DecksmithError> {
    let dir = output_path.parent().ok_or_else(|| {
        DecksmithError::Custom(format!("No parent directory for {}", output_path.display()))
    })?;
    fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.persist(output_path).map_err(|e| DecksmithError::Io(Box::new(e.error)))?;

    Ok(())
}
