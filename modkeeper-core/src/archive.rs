//! Module packages as gzip-compressed tarballs
//!
//! Extraction always happens into a fresh, process-unique temporary directory
//! that is removed when the returned [`TempDir`] is dropped.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};
use tempfile::TempDir;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::ModuleError;

/// File extension of module packages
pub const ARCHIVE_EXTENSION: &str = "tar.gz";

/// How deep below the archive root a manifest is searched for
pub const MAX_MANIFEST_DEPTH: usize = 8;

/// An archive written by [`pack_directory`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportedArchive {
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// `sha256:<hex>` digest of the archive bytes
    pub digest: String,
}

/// Unpack `archive` into a new temporary directory
pub fn extract(archive: &Path) -> Result<TempDir, ModuleError> {
    let file = File::open(archive).map_err(|source| ModuleError::InvalidPackage {
        reason: "could not open archive".to_string(),
        source: Some(source),
    })?;

    let temp_dir = tempfile::Builder::new()
        .prefix("modkeeper-install-")
        .tempdir()
        .map_err(|e| ModuleError::io("Failed to create extraction directory", archive, e))?;

    let mut tarball = Archive::new(GzDecoder::new(BufReader::new(file)));
    tarball
        .unpack(temp_dir.path())
        .map_err(|source| ModuleError::InvalidPackage {
            reason: "could not extract archive".to_string(),
            source: Some(source),
        })?;

    debug!(
        "Extracted {} to {}",
        archive.display(),
        temp_dir.path().display()
    );
    Ok(temp_dir)
}

/// Find the first file called `manifest_file` below `root`
///
/// The walk is depth-first. Within a directory, files come before
/// subdirectories and each group is visited in file-name order, so a
/// manifest at the package root wins over one nested below it. Symlinks
/// are not followed.
pub fn locate_manifest(root: &Path, manifest_file: &str) -> Option<PathBuf> {
    WalkDir::new(root)
        .min_depth(1)
        .max_depth(MAX_MANIFEST_DEPTH)
        .sort_by(|a, b| {
            a.file_type()
                .is_dir()
                .cmp(&b.file_type().is_dir())
                .then_with(|| a.file_name().cmp(b.file_name()))
        })
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_type().is_file() && e.file_name() == manifest_file)
        .map(|e| e.into_path())
}

/// Regular files under `root` as (absolute, relative) pairs, sorted
fn leaf_files(root: &Path) -> Result<Vec<(PathBuf, PathBuf)>, ModuleError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            ModuleError::io("Failed to walk module directory", path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| PathBuf::from(entry.file_name()));
        files.push((entry.into_path(), relative));
    }
    Ok(files)
}

/// Write every regular file under `source` into a tarball at `output`
///
/// Entry names are paths relative to `source`; directories get no entries of
/// their own. The archive is written to a temporary file next to `output` and
/// renamed over it, so a reader never sees a partial archive.
pub fn pack_directory(source: &Path, output: &Path) -> Result<ExportedArchive, ModuleError> {
    let files = leaf_files(source)?;

    let mut builder = Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, relative) in &files {
        builder
            .append_path_with_name(path, relative)
            .map_err(|e| ModuleError::io("Failed to add file to archive", path, e))?;
    }
    let bytes = builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .map_err(|e| ModuleError::io("Failed to finalize archive", output, e))?;

    let parent = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)
        .map_err(|e| ModuleError::io("Failed to create export directory", parent, e))?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| ModuleError::io("Failed to create archive", parent, e))?;
    temp.write_all(&bytes)
        .map_err(|e| ModuleError::io("Failed to write archive", temp.path(), e))?;
    temp.persist(output)
        .map_err(|e| ModuleError::io("Failed to replace archive", output, e.error))?;

    debug!("Packed {} files into {}", files.len(), output.display());

    Ok(ExportedArchive {
        path: output.to_path_buf(),
        size: bytes.len() as u64,
        digest: format!("sha256:{}", hex::encode(Sha256::digest(&bytes))),
    })
}
