// upscaler/src/core/job.rs
use super::{ErrorKind, Result, UpscaleError};
use image::ImageFormat;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Image types accepted at intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageMime {
    Png,
    Jpeg,
    WebP,
}

impl ImageMime {
    pub fn parse(mime_type: &str) -> Option<Self> {
        match mime_type.trim().to_ascii_lowercase().as_str() {
            "image/png" => Some(ImageMime::Png),
            "image/jpeg" | "image/jpg" => Some(ImageMime::Jpeg),
            "image/webp" => Some(ImageMime::WebP),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        ImageFormat::from_path(path).ok().and_then(Self::from_format)
    }

    pub fn from_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Some(ImageMime::Png),
            ImageFormat::Jpeg => Some(ImageMime::Jpeg),
            ImageFormat::WebP => Some(ImageMime::WebP),
            _ => None,
        }
    }

    /// Sniffs the container from the leading bytes.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        image::guess_format(data).ok().and_then(Self::from_format)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ImageMime::Png => "image/png",
            ImageMime::Jpeg => "image/jpeg",
            ImageMime::WebP => "image/webp",
        }
    }

    pub fn format(self) -> ImageFormat {
        match self {
            ImageMime::Png => ImageFormat::Png,
            ImageMime::Jpeg => ImageFormat::Jpeg,
            ImageMime::WebP => ImageFormat::WebP,
        }
    }
}

impl fmt::Display for ImageMime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to a user-supplied file. The bytes are read when the job runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
}

impl SourceFile {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)
            .map_err(|e| UpscaleError::ReadFailure(format!("{}: {}", path.display(), e)))?;

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                UpscaleError::InvalidParameter(format!("Invalid file name: {}", path.display()))
            })?;

        let mime_type = ImageMime::from_path(path)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        Ok(Self {
            path: path.to_path_buf(),
            name,
            size: metadata.len(),
            mime_type,
        })
    }

    pub fn image_mime(&self) -> Option<ImageMime> {
        ImageMime::parse(&self.mime_type)
    }

    /// File name without its extension, used to name exports.
    pub fn basename(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.name)
    }
}

/// Counts preview references handed out to jobs.
#[derive(Debug, Clone, Default)]
pub struct PreviewRegistry {
    live: Arc<AtomicUsize>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub(crate) fn derive(&self, id: JobId, source: &SourceFile) -> Preview {
        self.live.fetch_add(1, Ordering::SeqCst);
        Preview {
            url: format!("preview://{}/{}", id, source.name),
            path: source.path.clone(),
            live: Arc::clone(&self.live),
        }
    }
}

/// A job's preview reference. Released when dropped.
#[derive(Debug)]
pub struct Preview {
    url: String,
    path: PathBuf,
    live: Arc<AtomicUsize>,
}

impl Preview {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Preview {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        log::debug!("Released preview {}", self.url);
    }
}

/// Encoded output of an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnhancedImage {
    pub data: Arc<[u8]>,
    pub mime: ImageMime,
    pub width: u32,
    pub height: u32,
}

impl EnhancedImage {
    pub fn new(data: Vec<u8>, mime: ImageMime, width: u32, height: u32) -> Self {
        Self {
            data: data.into(),
            mime,
            width,
            height,
        }
    }

    pub fn byte_size(&self) -> usize {
        self.data.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    /// Eligible for pick-up by a batch run.
    pub fn is_runnable(self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Error)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

/// Why a job ended in `Error`: the kind picks the localized text, the
/// message keeps the detail for logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&UpscaleError> for JobFailure {
    fn from(error: &UpscaleError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Status together with the data only that status may carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Processing,
    Completed(EnhancedImage),
    Error(JobFailure),
}

impl JobState {
    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Queued => JobStatus::Queued,
            JobState::Processing => JobStatus::Processing,
            JobState::Completed(_) => JobStatus::Completed,
            JobState::Error(_) => JobStatus::Error,
        }
    }
}

#[derive(Debug)]
pub struct Job {
    id: JobId,
    source: SourceFile,
    preview: Preview,
    state: JobState,
}

impl Job {
    pub(crate) fn new(source: SourceFile, previews: &PreviewRegistry) -> Self {
        let id = JobId::new();
        let preview = previews.derive(id, &source);
        Self {
            id,
            source,
            preview,
            state: JobState::Queued,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn source(&self) -> &SourceFile {
        &self.source
    }

    pub fn preview(&self) -> &Preview {
        &self.preview
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    pub fn upscaled_image(&self) -> Option<&EnhancedImage> {
        match &self.state {
            JobState::Completed(image) => Some(image),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        self.failure().map(|failure| failure.message.as_str())
    }

    pub fn failure(&self) -> Option<&JobFailure> {
        match &self.state {
            JobState::Error(failure) => Some(failure),
            _ => None,
        }
    }

    /// `Queued | Error -> Processing`. Drops any previous error message.
    pub(crate) fn start(&mut self) -> Result<()> {
        if !self.status().is_runnable() {
            return Err(UpscaleError::InvalidParameter(format!(
                "Job {} cannot start from {:?}",
                self.id,
                self.status()
            )));
        }
        self.state = JobState::Processing;
        Ok(())
    }

    /// `Processing -> Completed | Error`.
    pub(crate) fn finish(&mut self, outcome: Result<EnhancedImage>) -> Result<()> {
        if self.status() != JobStatus::Processing {
            return Err(UpscaleError::InvalidParameter(format!(
                "Job {} is not processing",
                self.id
            )));
        }
        self.state = match outcome {
            Ok(image) => JobState::Completed(image),
            Err(e) => JobState::Error(JobFailure::from(&e)),
        };
        Ok(())
    }

    /// `Processing -> Queued`, for a run that stopped before the job
    /// finished. False when the job was not processing.
    pub(crate) fn interrupt(&mut self) -> bool {
        if self.status() != JobStatus::Processing {
            return false;
        }
        self.state = JobState::Queued;
        true
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            source: self.source.clone(),
            preview_url: self.preview.url().to_string(),
            state: self.state.clone(),
        }
    }
}

/// Read-only copy of a job handed out by the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub id: JobId,
    pub source: SourceFile,
    pub preview_url: String,
    pub state: JobState,
}

impl JobSnapshot {
    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    pub fn upscaled_image(&self) -> Option<&EnhancedImage> {
        match &self.state {
            JobState::Completed(image) => Some(image),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        self.failure().map(|failure| failure.message.as_str())
    }

    pub fn failure(&self) -> Option<&JobFailure> {
        match &self.state {
            JobState::Error(failure) => Some(failure),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(name: &str) -> SourceFile {
        SourceFile {
            path: PathBuf::from(name),
            name: name.to_string(),
            size: 10,
            mime_type: "image/png".to_string(),
        }
    }

    #[test]
    fn mime_parsing_accepts_only_intake_types() {
        assert_eq!(ImageMime::parse("image/png"), Some(ImageMime::Png));
        assert_eq!(ImageMime::parse("IMAGE/JPEG"), Some(ImageMime::Jpeg));
        assert_eq!(ImageMime::parse("image/webp"), Some(ImageMime::WebP));
        assert_eq!(ImageMime::parse("image/gif"), None);
        assert_eq!(ImageMime::from_path(Path::new("a/b.JPG")), Some(ImageMime::Jpeg));
        assert_eq!(ImageMime::from_path(Path::new("a/b.tiff")), None);
    }

    #[test]
    fn basename_strips_extension() {
        assert_eq!(source("holiday.photo.png").basename(), "holiday.photo");
        assert_eq!(source("noext").basename(), "noext");
    }

    #[test]
    fn result_and_error_follow_the_state() {
        let registry = PreviewRegistry::new();
        let mut job = Job::new(source("a.png"), &registry);
        assert_eq!(job.status(), JobStatus::Queued);
        assert!(job.upscaled_image().is_none() && job.error().is_none());

        job.start().unwrap();
        job.finish(Err(UpscaleError::NoImageReturned)).unwrap();
        assert_eq!(job.status(), JobStatus::Error);
        assert_eq!(job.failure().unwrap().kind, ErrorKind::NoImageReturned);
        assert!(job.error().unwrap().contains("No upscaled image"));
        assert!(job.upscaled_image().is_none());

        job.start().unwrap();
        assert!(job.error().is_none());
        job.finish(Ok(EnhancedImage::new(vec![1, 2, 3], ImageMime::Png, 2, 2)))
            .unwrap();
        assert_eq!(job.status(), JobStatus::Completed);
        assert!(job.error().is_none());
        assert_eq!(job.upscaled_image().unwrap().byte_size(), 3);
    }

    #[test]
    fn completed_jobs_cannot_restart() {
        let registry = PreviewRegistry::new();
        let mut job = Job::new(source("a.png"), &registry);
        job.start().unwrap();
        job.finish(Ok(EnhancedImage::new(vec![0], ImageMime::Png, 1, 1)))
            .unwrap();
        assert!(job.start().is_err());
        assert!(job.finish(Err(UpscaleError::NoImageReturned)).is_err());
    }

    #[test]
    fn only_processing_jobs_can_be_interrupted() {
        let registry = PreviewRegistry::new();
        let mut job = Job::new(source("a.png"), &registry);
        assert!(!job.interrupt());

        job.start().unwrap();
        assert!(job.interrupt());
        assert_eq!(job.status(), JobStatus::Queued);
        assert!(job.error().is_none());
    }

    #[test]
    fn previews_are_released_on_drop() {
        let registry = PreviewRegistry::new();
        let a = Job::new(source("a.png"), &registry);
        let b = Job::new(source("b.png"), &registry);
        assert_eq!(registry.live(), 2);
        assert!(a.preview().url().ends_with("/a.png"));
        drop(a);
        assert_eq!(registry.live(), 1);
        drop(b);
        assert_eq!(registry.live(), 0);
    }
}
