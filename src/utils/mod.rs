// upscaler/src/utils/mod.rs
use crate::core::job::ImageMime;
use crate::core::{Result, UpscaleError};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const EXPORT_PREFIX: &str = "upscaled";

pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let exponent = ((bytes as f64).log(1024.0).floor() as usize).min(UNITS.len() - 1);
    let size = bytes as f64 / 1024_f64.powi(exponent as i32);

    format!("{:.2} {}", size, UNITS[exponent])
}

/// `upscaled-<basename>.png`
pub fn lossless_export_name(basename: &str) -> String {
    format!("{}-{}.png", EXPORT_PREFIX, sanitize_filename(basename))
}

/// `upscaled-<basename>-q<quality>.jpg`
pub fn lossy_export_name(basename: &str, quality: u8) -> String {
    format!("{}-{}-q{}.jpg", EXPORT_PREFIX, sanitize_filename(basename), quality)
}

pub fn is_supported_format(path: &Path) -> bool {
    ImageMime::from_path(path).is_some()
}

/// Expands `inputs` into image files. Directories are walked (one level
/// unless `recursive`) and keep only supported extensions; explicit files
/// are passed through so intake can report them.
pub fn collect_image_paths(inputs: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for input in inputs {
        if input.is_file() {
            paths.push(input.clone());
            continue;
        }
        if !input.is_dir() {
            return Err(UpscaleError::ReadFailure(format!(
                "{} does not exist",
                input.display()
            )));
        }

        let walker = WalkDir::new(input)
            .min_depth(1)
            .max_depth(if recursive { usize::MAX } else { 1 })
            .sort_by_file_name();

        for entry in walker {
            let entry = entry.map_err(|e| UpscaleError::ReadFailure(e.to_string()))?;
            if entry.file_type().is_file() && is_supported_format(entry.path()) {
                paths.push(entry.into_path());
            }
        }
    }

    log::debug!("Collected {} input files", paths.len());
    Ok(paths)
}

pub fn sanitize_filename(filename: &str) -> String {
    let invalid_chars = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];
    filename
        .chars()
        .map(|c| if invalid_chars.contains(&c) { '_' } else { c })
        .collect()
}
