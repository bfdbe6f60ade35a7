// Packages a directory into a single ZIP so it can be uploaded as one file.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// A directory packed into a temporary ZIP, removed on drop.
pub struct DirectoryArchive {
    file: NamedTempFile,
    display_name: String,
    entries: usize,
}

impl DirectoryArchive {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// `<directory name>.zip`
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Number of files added.
    pub fn entries(&self) -> usize {
        self.entries
    }
}

/// Zip every regular file below `dir`. Entry names are relative to the
/// directory's parent, so the archive has the directory itself as its root.
/// Symlinks and other non-regular files are skipped.
pub fn zip_directory(dir: &Path) -> Result<DirectoryArchive> {
    let dir_name = archive_root_name(dir);
    let file = NamedTempFile::new().context("Failed to create temporary archive")?;
    let writer = file
        .reopen()
        .context("Failed to open temporary archive for writing")?;
    let mut zip = ZipWriter::new(writer);
    let options = SimpleFileOptions::default();
    let mut entries = 0;

    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            if !entry.file_type().is_dir() {
                debug!(path = %entry.path().display(), "Ignored non-file");
            }
            continue;
        }
        let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        let name = entry_name(&dir_name, relative);
        zip.start_file(name.as_str(), options)
            .with_context(|| format!("Failed to add {} to archive", name))?;
        let mut source = File::open(entry.path())
            .with_context(|| format!("Failed to read {}", entry.path().display()))?;
        io::copy(&mut source, &mut zip)
            .with_context(|| format!("Failed to compress {}", entry.path().display()))?;
        entries += 1;
    }
    zip.finish().context("Failed to finish archive")?;

    debug!(dir = %dir.display(), entries, "Directory archived");
    Ok(DirectoryArchive {
        file,
        display_name: format!("{}.zip", dir_name),
        entries,
    })
}

fn archive_root_name(dir: &Path) -> String {
    let absolute: PathBuf = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    absolute
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string())
}

/// Forward-slash entry name regardless of platform separator.
fn entry_name(root: &str, relative: &Path) -> String {
    let mut name = root.to_string();
    for component in relative.components() {
        name.push('/');
        name.push_str(&component.as_os_str().to_string_lossy());
    }
    name
}
