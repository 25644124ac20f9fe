//! Resource Fetcher: bring remote or local artifacts into a destination
//! directory.
//!
//! A location reference containing `://` is downloaded over HTTP; anything
//! else is treated as a local path and copied. Either way the artifact lands
//! under the destination directory named after the last path segment of the
//! reference, and is marked executable (plugin artifacts are binaries).

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Seam for artifact retrieval so orchestration tests can fabricate
/// downloads.
pub trait Fetch {
    /// Fetch `reference` into `dest_dir`, returning the local path.
    fn fetch(&self, reference: &str, dest_dir: &Path) -> Result<PathBuf>;
}

/// Fetches remote references over HTTP and copies local ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpFetcher;

impl Fetch for HttpFetcher {
    fn fetch(&self, reference: &str, dest_dir: &Path) -> Result<PathBuf> {
        let name = artifact_name(reference)?;
        let dest = dest_dir.join(name);
        tracing::info!(reference, dest = %dest.display(), "fetching artifact");
        if is_remote(reference) {
            download(reference, dest_dir, &dest)
                .with_context(|| format!("download {reference}"))?;
        } else {
            fs::copy(reference, &dest)
                .with_context(|| format!("copy {reference} to {}", dest.display()))?;
        }
        mark_executable(&dest)?;
        Ok(dest)
    }
}

pub fn is_remote(reference: &str) -> bool {
    reference.contains("://")
}

/// Last path segment of a location reference; must be non-empty.
pub fn artifact_name(reference: &str) -> Result<&str> {
    let name = reference.rsplit('/').next().unwrap_or(reference);
    if name.is_empty() {
        return Err(anyhow!("cannot derive a file name from {reference:?}"));
    }
    Ok(name)
}

fn download(url: &str, dest_dir: &Path, dest: &Path) -> Result<()> {
    // Stage in the destination dir so the final persist is a same-filesystem
    // rename and a failed download never leaves a partial artifact behind.
    let mut staged = NamedTempFile::new_in(dest_dir).context("create staging file")?;
    let response = ureq::get(url).call().context("http request")?;
    let mut reader = response.into_body().into_reader();
    io::copy(&mut reader, staged.as_file_mut()).context("write response body")?;
    staged
        .persist(dest)
        .with_context(|| format!("persist {}", dest.display()))?;
    Ok(())
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("chmod {}", path.display()))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<()> {
    Ok(())
}
