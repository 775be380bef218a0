//! Scanner module - Subfolder enumeration and video classification
//!
//! This module walks the immediate children of a root folder and
//! classifies the video files found inside each one.

use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Extension whose presence marks a subfolder as satisfied.
pub const PREFERRED_EXTENSION: &str = "mp4";

/// Recognized video file extensions (lowercase, without dot).
pub const VIDEO_EXTENSIONS: [&str; 10] = [
    "mp4", "mov", "avi", "mkv", "webm", "flv", "wmv", "ogv", "3gp", "mpeg",
];

/// Check whether an extension belongs to the known video-format set.
pub fn is_video_extension(ext: &str) -> bool {
    VIDEO_EXTENSIONS
        .iter()
        .any(|known| known.eq_ignore_ascii_case(ext))
}

/// Scan result for a single subfolder
#[derive(Debug, Clone)]
pub struct FolderScan {
    /// Subfolder name
    pub name: String,
    /// Absolute path to the subfolder
    pub path: PathBuf,
    /// Whether a matching file with the preferred extension exists
    pub preferred_present: bool,
    /// File names whose stem equals the subfolder name and whose
    /// extension is a recognized video format
    pub matching_files: Vec<String>,
    /// Display summary of the non-preferred extensions among the matches
    pub other_formats: String,
}

/// Scan the immediate subfolders of `root`.
///
/// Any I/O failure aborts the scan; the caller surfaces it to the user.
pub fn scan_root(root: &Path) -> io::Result<Vec<FolderScan>> {
    let mut folders = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        folders.push(scan_subfolder(entry.path(), &name)?);
    }

    log::debug!("Scanned {}: {} subfolder(s)", root.display(), folders.len());
    Ok(folders)
}

/// Classify the video files directly inside one subfolder.
fn scan_subfolder(path: &Path, name: &str) -> io::Result<FolderScan> {
    let mut matching_files = Vec::new();
    let mut preferred_present = false;

    for entry in WalkDir::new(path)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().to_string();
        let Some(ext) = normalized_extension(&file_name) else {
            continue;
        };
        if !is_video_extension(&ext) {
            continue;
        }
        // Only files named exactly after the subfolder count as its video.
        if file_stem(&file_name) != name {
            continue;
        }
        if ext == PREFERRED_EXTENSION {
            preferred_present = true;
        }
        matching_files.push(file_name);
    }

    let other_formats = matching_files
        .iter()
        .filter(|file| normalized_extension(file).is_some_and(|ext| ext != PREFERRED_EXTENSION))
        .filter_map(|file| raw_extension(file))
        .map(|ext| format!(".{ext}"))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(FolderScan {
        name: name.to_string(),
        path: path.to_path_buf(),
        preferred_present,
        matching_files,
        other_formats,
    })
}

/// Lowercased extension of a file name, without the dot.
pub fn normalized_extension(file_name: &str) -> Option<String> {
    raw_extension(file_name).map(|ext| ext.to_ascii_lowercase())
}

/// Extension exactly as written on disk, without the dot.
fn raw_extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_string())
}

fn file_stem(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
}
