//! File operations module - Cleanup run over scanned subfolders
//!
//! This module relocates subfolders that lack the preferred format and
//! deletes discarded formats, with optional verified backup copies.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::run_log::RunLog;
use crate::scanner::{normalized_extension, FolderScan, PREFERRED_EXTENSION, VIDEO_EXTENSIONS};

/// Sibling directory receiving subfolders without the preferred format.
pub const RELOCATED_DIR_NAME: &str = "no_mp4";

/// Sibling directory receiving backup copies of deleted files.
pub const BACKUP_DIR_NAME: &str = "backup_deleted";

/// Keep/discard choice per known video extension
#[derive(Debug, Clone)]
pub struct FormatSelection {
    keep: BTreeMap<String, bool>,
}

impl Default for FormatSelection {
    fn default() -> Self {
        let keep = VIDEO_EXTENSIONS
            .iter()
            .map(|ext| (ext.to_string(), *ext == PREFERRED_EXTENSION))
            .collect();
        Self { keep }
    }
}

impl FormatSelection {
    /// Rebuild a selection from a stored set of kept extensions.
    pub fn from_kept(kept: &BTreeSet<String>) -> Self {
        let mut selection = Self::default();
        for (ext, keep) in &mut selection.keep {
            *keep = kept.contains(ext);
        }
        selection
    }

    pub fn is_kept(&self, ext: &str) -> bool {
        self.keep.get(ext).copied().unwrap_or(false)
    }

    pub fn set_kept(&mut self, ext: &str, kept: bool) {
        if let Some(flag) = self.keep.get_mut(ext) {
            *flag = kept;
        }
    }

    pub fn keep_extensions(&self) -> BTreeSet<String> {
        self.keep
            .iter()
            .filter(|(_, kept)| **kept)
            .map(|(ext, _)| ext.clone())
            .collect()
    }

    pub fn discard_extensions(&self) -> BTreeSet<String> {
        self.keep
            .iter()
            .filter(|(_, kept)| !**kept)
            .map(|(ext, _)| ext.clone())
            .collect()
    }
}

/// Options for one cleanup run, read once at run start
#[derive(Debug, Clone)]
pub struct CleanupOptions {
    pub keep: BTreeSet<String>,
    pub discard: BTreeSet<String>,
    pub backup: bool,
}

impl CleanupOptions {
    pub fn from_selection(selection: &FormatSelection, backup: bool) -> Self {
        Self {
            keep: selection.keep_extensions(),
            discard: selection.discard_extensions(),
            backup,
        }
    }
}

/// Counts and errors from one cleanup run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub folders_moved: usize,
    pub files_deleted: usize,
    pub errors: Vec<String>,
}

/// Executes one cleanup pass over scanned subfolders
pub struct CleanupRunner {
    relocate_dir: PathBuf,
    backup_dir: Option<PathBuf>,
    discard: BTreeSet<String>,
    log: RunLog,
}

impl CleanupRunner {
    /// Prepare a run: create the sibling directories and open the log.
    pub fn new(root: &Path, options: &CleanupOptions) -> io::Result<Self> {
        Self::with_log(root, options, RunLog::open_default()?)
    }

    fn with_log(root: &Path, options: &CleanupOptions, mut log: RunLog) -> io::Result<Self> {
        let parent = root.parent().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "root folder has no parent directory",
            )
        })?;

        let relocate_dir = parent.join(RELOCATED_DIR_NAME);
        fs::create_dir_all(&relocate_dir)?;

        let backup_dir = options.backup.then(|| parent.join(BACKUP_DIR_NAME));
        if let Some(dir) = &backup_dir {
            fs::create_dir_all(dir)?;
        }

        log.line("=== Cleanup started ===");
        log.line(&format!("Root folder: {}", root.display()));
        log.line(&format!("Keep: {}", format_extension_set(&options.keep)));
        log.line(&format!("Delete: {}", format_extension_set(&options.discard)));
        log.line(&format!("Backup: {}", options.backup));
        log.line("");

        Ok(Self {
            relocate_dir,
            backup_dir,
            discard: options.discard.clone(),
            log,
        })
    }

    /// Run the cleanup pass. Per-file failures are logged and skipped;
    /// a folder move failure aborts the run.
    pub fn run(
        &mut self,
        folders: &[FolderScan],
        progress: &AtomicUsize,
    ) -> io::Result<RunSummary> {
        let mut summary = RunSummary::default();

        for folder in folders {
            if folder.preferred_present {
                self.discard_unkept_files(folder, &mut summary);
            } else {
                match self.relocate_folder(folder) {
                    Ok(true) => summary.folders_moved += 1,
                    Ok(false) => {}
                    Err(e) => {
                        self.log.line(&format!("Error moving {}: {}", folder.name, e));
                        return Err(e);
                    }
                }
            }
            progress.fetch_add(1, Ordering::Relaxed);
        }

        self.log.line("");
        self.log.line(&format!(
            "Moved {} folder(s). Deleted {} file(s).",
            summary.folders_moved, summary.files_deleted
        ));
        self.log.line("=== Cleanup complete ===");
        self.log.line("");

        Ok(summary)
    }

    /// Move a subfolder into the relocation directory.
    ///
    /// Returns false when a same-named destination already exists; the
    /// original is left untouched and nothing is reported.
    fn relocate_folder(&mut self, folder: &FolderScan) -> io::Result<bool> {
        let dest = self.relocate_dir.join(&folder.name);
        if dest.exists() {
            log::debug!("Skipping {}: destination already exists", folder.name);
            return Ok(false);
        }
        move_dir(&folder.path, &dest)?;
        self.log.line(&format!("Moved: {}", folder.name));
        Ok(true)
    }

    /// Delete the matching files whose extension is marked for discard.
    fn discard_unkept_files(&mut self, folder: &FolderScan, summary: &mut RunSummary) {
        for file_name in &folder.matching_files {
            let Some(ext) = normalized_extension(file_name) else {
                continue;
            };
            if !self.discard.contains(&ext) {
                continue;
            }
            let path = folder.path.join(file_name);
            match self.delete_file(&path, &folder.name, file_name) {
                Ok(()) => {
                    summary.files_deleted += 1;
                    self.log
                        .line(&format!("Deleted: {} from {}", file_name, folder.name));
                }
                Err(e) => {
                    let msg = format!("Error deleting {file_name}: {e}");
                    log::warn!("{msg}");
                    self.log.line(&msg);
                    summary.errors.push(msg);
                }
            }
        }
    }

    /// Back up (when enabled) and remove one file. The original is only
    /// removed once the backup copy has been verified.
    fn delete_file(&mut self, path: &Path, folder_name: &str, file_name: &str) -> io::Result<()> {
        if let Some(backup_root) = &self.backup_dir {
            let dest_dir = backup_root.join(folder_name);
            fs::create_dir_all(&dest_dir)?;
            copy_verified(path, &dest_dir.join(file_name))?;
        }
        fs::remove_file(path)
    }
}

/// Move a directory, falling back to copy + delete for cross-drive moves.
pub fn move_dir(source: &Path, dest: &Path) -> io::Result<()> {
    match fs::rename(source, dest) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            log::debug!(
                "Rename {} -> {} failed ({rename_err}), copying instead",
                source.display(),
                dest.display()
            );
            if let Err(copy_err) = copy_dir_recursive(source, dest) {
                // Don't leave a partial copy behind.
                let _ = fs::remove_dir_all(dest);
                return Err(copy_err);
            }
            fs::remove_dir_all(source)
        }
    }
}

/// Copy a directory tree, preserving its relative structure.
fn copy_dir_recursive(source: &Path, dest: &Path) -> io::Result<()> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?;
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Copy a file and verify the copy is byte-identical to the source.
fn copy_verified(source: &Path, dest: &Path) -> io::Result<()> {
    fs::copy(source, dest)?;
    if file_digest(source)? != file_digest(dest)? {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("backup copy of {} does not match the original", source.display()),
        ));
    }
    Ok(())
}

/// Compute the SHA-256 digest of a file with chunked reading.
fn file_digest(path: &Path) -> io::Result<String> {
    const BUFFER_SIZE: usize = 1024 * 1024;

    let file = fs::File::open(path)?;
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Render an extension set for the log, e.g. ".avi, .mkv".
fn format_extension_set(extensions: &BTreeSet<String>) -> String {
    if extensions.is_empty() {
        return "(none)".to_string();
    }
    extensions
        .iter()
        .map(|ext| format!(".{ext}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::scanner::scan_root;

    struct Fixture {
        _dir: tempfile::TempDir,
        parent: PathBuf,
        root: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().to_path_buf();
        let root = parent.join("videos");
        fs::create_dir(&root).unwrap();
        Fixture {
            _dir: dir,
            parent,
            root,
        }
    }

    fn make_clip(root: &Path, name: &str, extensions: &[&str]) {
        let folder = root.join(name);
        fs::create_dir(&folder).unwrap();
        for ext in extensions {
            fs::write(folder.join(format!("{name}.{ext}")), format!("{name}-{ext}")).unwrap();
        }
    }

    fn run(fx: &Fixture, backup: bool) -> RunSummary {
        let options = CleanupOptions::from_selection(&FormatSelection::default(), backup);
        let log = RunLog::open(&fx.parent.join("test_log.txt")).unwrap();
        let folders = scan_root(&fx.root).unwrap();
        let mut runner = CleanupRunner::with_log(&fx.root, &options, log).unwrap();
        runner.run(&folders, &AtomicUsize::new(0)).unwrap()
    }

    fn log_contents(fx: &Fixture) -> String {
        fs::read_to_string(fx.parent.join("test_log.txt")).unwrap()
    }

    #[test]
    fn test_default_selection_keeps_only_preferred() {
        let selection = FormatSelection::default();
        assert_eq!(
            selection.keep_extensions(),
            BTreeSet::from(["mp4".to_string()])
        );
        assert_eq!(selection.discard_extensions().len(), VIDEO_EXTENSIONS.len() - 1);
        assert!(selection.is_kept("mp4"));
        assert!(!selection.is_kept("avi"));
    }

    #[test]
    fn test_selection_round_trips_through_kept_set() {
        let mut selection = FormatSelection::default();
        selection.set_kept("mkv", true);
        let restored = FormatSelection::from_kept(&selection.keep_extensions());
        assert!(restored.is_kept("mkv"));
        assert!(restored.is_kept("mp4"));
        assert!(!restored.is_kept("avi"));
    }

    #[test]
    fn test_discarded_format_deleted_with_backup() {
        let fx = fixture();
        make_clip(&fx.root, "clip1", &["mp4", "avi"]);

        let summary = run(&fx, true);

        assert_eq!(summary.files_deleted, 1);
        assert_eq!(summary.folders_moved, 0);
        assert!(summary.errors.is_empty());
        // Folder stays, the discarded format is gone, the kept one remains.
        assert!(fx.root.join("clip1/clip1.mp4").exists());
        assert!(!fx.root.join("clip1/clip1.avi").exists());
        // Backup copy is byte-identical to what was deleted.
        let backup = fx.parent.join(BACKUP_DIR_NAME).join("clip1/clip1.avi");
        assert_eq!(fs::read(&backup).unwrap(), b"clip1-avi");
        assert!(log_contents(&fx).contains("Deleted: clip1.avi from clip1"));
    }

    #[test]
    fn test_no_backup_when_disabled() {
        let fx = fixture();
        make_clip(&fx.root, "clip1", &["mp4", "avi"]);

        let summary = run(&fx, false);

        assert_eq!(summary.files_deleted, 1);
        assert!(!fx.root.join("clip1/clip1.avi").exists());
        assert!(!fx.parent.join(BACKUP_DIR_NAME).exists());
    }

    #[test]
    fn test_folder_without_preferred_is_relocated() {
        let fx = fixture();
        make_clip(&fx.root, "clip2", &["avi"]);

        let summary = run(&fx, true);

        assert_eq!(summary.folders_moved, 1);
        assert_eq!(summary.files_deleted, 0);
        assert!(!fx.root.join("clip2").exists());
        assert!(fx
            .parent
            .join(RELOCATED_DIR_NAME)
            .join("clip2/clip2.avi")
            .exists());
        assert!(log_contents(&fx).contains("Moved: clip2"));
    }

    #[test]
    fn test_existing_destination_skipped_silently() {
        let fx = fixture();
        make_clip(&fx.root, "clip2", &["avi"]);
        fs::create_dir_all(fx.parent.join(RELOCATED_DIR_NAME).join("clip2")).unwrap();

        let summary = run(&fx, true);

        assert_eq!(summary.folders_moved, 0);
        assert!(summary.errors.is_empty());
        // Original left untouched.
        assert!(fx.root.join("clip2/clip2.avi").exists());
    }

    #[test]
    fn test_second_run_is_idempotent_for_moves() {
        let fx = fixture();
        make_clip(&fx.root, "clip1", &["mp4", "avi"]);
        make_clip(&fx.root, "clip2", &["avi"]);

        let first = run(&fx, true);
        assert_eq!(first.folders_moved, 1);
        assert_eq!(first.files_deleted, 1);

        let second = run(&fx, true);
        assert_eq!(second.folders_moved, 0);
        assert_eq!(second.files_deleted, 0);
    }

    #[test]
    fn test_kept_formats_survive() {
        let fx = fixture();
        make_clip(&fx.root, "clip1", &["mp4", "mkv", "avi"]);

        let options = {
            let mut selection = FormatSelection::default();
            selection.set_kept("mkv", true);
            CleanupOptions::from_selection(&selection, false)
        };
        let log = RunLog::open(&fx.parent.join("test_log.txt")).unwrap();
        let folders = scan_root(&fx.root).unwrap();
        let mut runner = CleanupRunner::with_log(&fx.root, &options, log).unwrap();
        let summary = runner.run(&folders, &AtomicUsize::new(0)).unwrap();

        assert_eq!(summary.files_deleted, 1);
        assert!(fx.root.join("clip1/clip1.mp4").exists());
        assert!(fx.root.join("clip1/clip1.mkv").exists());
        assert!(!fx.root.join("clip1/clip1.avi").exists());
    }

    #[test]
    fn test_missing_file_is_logged_and_run_continues() {
        let fx = fixture();
        make_clip(&fx.root, "clip1", &["mp4", "avi"]);

        let mut folders = scan_root(&fx.root).unwrap();
        // Simulate the filesystem changing between scan and action.
        folders[0].matching_files.push("clip1.mov".to_string());

        let options = CleanupOptions::from_selection(&FormatSelection::default(), true);
        let log = RunLog::open(&fx.parent.join("test_log.txt")).unwrap();
        let mut runner = CleanupRunner::with_log(&fx.root, &options, log).unwrap();
        let summary = runner.run(&folders, &AtomicUsize::new(0)).unwrap();

        assert_eq!(summary.files_deleted, 1);
        assert_eq!(summary.errors.len(), 1);
        assert!(log_contents(&fx).contains("Error deleting clip1.mov"));
    }

    #[test]
    fn test_progress_counts_every_folder() {
        let fx = fixture();
        make_clip(&fx.root, "clip1", &["mp4"]);
        make_clip(&fx.root, "clip2", &["avi"]);
        make_clip(&fx.root, "clip3", &["mp4", "mov"]);

        let options = CleanupOptions::from_selection(&FormatSelection::default(), false);
        let log = RunLog::open(&fx.parent.join("test_log.txt")).unwrap();
        let folders = scan_root(&fx.root).unwrap();
        let mut runner = CleanupRunner::with_log(&fx.root, &options, log).unwrap();
        let progress = AtomicUsize::new(0);
        runner.run(&folders, &progress).unwrap();

        assert_eq!(progress.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_run_summary_written_to_log() {
        let fx = fixture();
        make_clip(&fx.root, "clip1", &["mp4", "avi"]);
        make_clip(&fx.root, "clip2", &["avi"]);

        run(&fx, true);

        let log = log_contents(&fx);
        assert!(log.contains("=== Cleanup started ==="));
        assert!(log.contains("Keep: .mp4"));
        assert!(log.contains("Backup: true"));
        assert!(log.contains("Moved 1 folder(s). Deleted 1 file(s)."));
        assert!(log.contains("=== Cleanup complete ==="));
    }

    #[test]
    fn test_copy_dir_recursive_preserves_structure() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src");
        fs::create_dir_all(source.join("inner/deep")).unwrap();
        fs::write(source.join("top.mp4"), b"top").unwrap();
        fs::write(source.join("inner/deep/leaf.srt"), b"leaf").unwrap();

        let dest = dir.path().join("dst");
        copy_dir_recursive(&source, &dest).unwrap();

        assert_eq!(fs::read(dest.join("top.mp4")).unwrap(), b"top");
        assert_eq!(fs::read(dest.join("inner/deep/leaf.srt")).unwrap(), b"leaf");
    }

    #[test]
    fn test_format_extension_set() {
        assert_eq!(format_extension_set(&BTreeSet::new()), "(none)");
        let set = BTreeSet::from(["avi".to_string(), "mkv".to_string()]);
        assert_eq!(format_extension_set(&set), ".avi, .mkv");
    }
}
