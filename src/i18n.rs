// upscaler/src/i18n.rs
//! English/Vietnamese message catalog and the persisted locale preference.

use crate::core::job::{JobFailure, JobStatus};
use crate::core::{ErrorKind, Result, UpscaleError};
use crate::processors::IntakeNotice;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const APP_DIR: &str = "upscaler";
const PREFERENCE_FILE: &str = "locale.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Vi,
}

impl Locale {
    pub const ALL: [Locale; 2] = [Locale::En, Locale::Vi];

    pub fn code(&self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Vi => "vi",
        }
    }

    /// Reads a language tag such as `vi_VN.UTF-8` or `en-US`.
    pub fn from_language_tag(tag: &str) -> Option<Self> {
        let primary = tag.split(['-', '_', '.']).next()?;
        primary.parse().ok()
    }
}

impl FromStr for Locale {
    type Err = UpscaleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Locale::En),
            "vi" => Ok(Locale::Vi),
            other => Err(UpscaleError::InvalidParameter(format!(
                "Unknown locale '{}' (expected en or vi)",
                other
            ))),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Fixed user-facing strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Text {
    SupportedFormats,
    Processing,
    ErrorPrefix,
    ErrorProcessImage,
    ErrorReadFile,
    ErrorNoImage,
    ErrorServiceUnavailable,
    ErrorUnknown,
    NothingToProcess,
    Saved,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Catalog {
    locale: Locale,
}

impl Catalog {
    pub fn new(locale: Locale) -> Self {
        Self { locale }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn text(&self, text: Text) -> &'static str {
        match (self.locale, text) {
            (Locale::En, Text::SupportedFormats) => "PNG, JPG, or WEBP (Max 5MB)",
            (Locale::En, Text::Processing) => "Processing...",
            (Locale::En, Text::ErrorPrefix) => "Error: ",
            (Locale::En, Text::ErrorProcessImage) => "Could not process image. Please try another file.",
            (Locale::En, Text::ErrorReadFile) => "Failed to read the image file.",
            (Locale::En, Text::ErrorNoImage) => {
                "No upscaled image was returned from the AI. The model may have refused the request."
            }
            (Locale::En, Text::ErrorServiceUnavailable) => {
                "Failed to upscale image. The AI service may be temporarily unavailable or the image format is not supported."
            }
            (Locale::En, Text::ErrorUnknown) => "An unknown error occurred during upscaling.",
            (Locale::En, Text::NothingToProcess) => "No queued or failed images to process.",
            (Locale::En, Text::Saved) => "Saved",

            (Locale::Vi, Text::SupportedFormats) => "PNG, JPG, hoặc WEBP (Tối đa 5MB)",
            (Locale::Vi, Text::Processing) => "Đang xử lý...",
            (Locale::Vi, Text::ErrorPrefix) => "Lỗi: ",
            (Locale::Vi, Text::ErrorProcessImage) => "Không thể xử lý hình ảnh. Vui lòng thử một tệp khác.",
            (Locale::Vi, Text::ErrorReadFile) => "Không thể đọc tệp hình ảnh.",
            (Locale::Vi, Text::ErrorNoImage) => {
                "AI không trả về hình ảnh đã nâng cấp. Mô hình có thể đã từ chối yêu cầu."
            }
            (Locale::Vi, Text::ErrorServiceUnavailable) => {
                "Không thể nâng cấp hình ảnh. Dịch vụ AI có thể tạm thời không khả dụng hoặc định dạng hình ảnh không được hỗ trợ."
            }
            (Locale::Vi, Text::ErrorUnknown) => "Đã xảy ra lỗi không xác định trong quá trình nâng cấp.",
            (Locale::Vi, Text::NothingToProcess) => "Không có ảnh nào đang chờ hoặc bị lỗi để xử lý.",
            (Locale::Vi, Text::Saved) => "Đã lưu",
        }
    }

    pub fn status(&self, status: JobStatus) -> &'static str {
        match (self.locale, status) {
            (Locale::En, JobStatus::Queued) => "Queued",
            (Locale::En, JobStatus::Processing) => "Processing",
            (Locale::En, JobStatus::Completed) => "Completed",
            (Locale::En, JobStatus::Error) => "Error",
            (Locale::Vi, JobStatus::Queued) => "Đang chờ",
            (Locale::Vi, JobStatus::Processing) => "Đang xử lý",
            (Locale::Vi, JobStatus::Completed) => "Hoàn tất",
            (Locale::Vi, JobStatus::Error) => "Lỗi",
        }
    }

    pub fn file_too_large(&self, limit_mb: u64) -> String {
        match self.locale {
            Locale::En => format!("File is too large. Please upload an image under {}MB.", limit_mb),
            Locale::Vi => format!("Tệp quá lớn. Vui lòng tải lên hình ảnh dưới {}MB.", limit_mb),
        }
    }

    pub fn intake_notice(&self, notice: &IntakeNotice) -> String {
        match notice {
            IntakeNotice::Oversized { name, limit_mb } => {
                format!("{}: {}", name, self.file_too_large(*limit_mb))
            }
            IntakeNotice::UnsupportedType { name, .. } => {
                format!("{}: {}", name, self.text(Text::SupportedFormats))
            }
        }
    }

    /// Localized body for an error kind, without the prefix.
    pub fn error_message(&self, kind: ErrorKind) -> String {
        let text = match kind {
            ErrorKind::FileTooLarge { limit_mb } => return self.file_too_large(limit_mb),
            ErrorKind::ProcessImage => Text::ErrorProcessImage,
            ErrorKind::ReadFile => Text::ErrorReadFile,
            ErrorKind::NoImageReturned => Text::ErrorNoImage,
            ErrorKind::ServiceUnavailable => Text::ErrorServiceUnavailable,
            ErrorKind::Unknown => Text::ErrorUnknown,
        };
        self.text(text).to_string()
    }

    /// Prefixed line for a failed job.
    pub fn job_error(&self, failure: &JobFailure) -> String {
        format!("{}{}", self.text(Text::ErrorPrefix), self.error_message(failure.kind))
    }

    /// Prefixed line for an error raised outside a job.
    pub fn error(&self, error: &UpscaleError) -> String {
        format!("{}{}", self.text(Text::ErrorPrefix), self.error_message(error.kind()))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LocalePreference {
    locale: Locale,
}

/// JSON file holding the chosen locale.
#[derive(Debug, Clone)]
pub struct LocaleStore {
    path: PathBuf,
}

impl LocaleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/upscaler/locale.json`, when the platform has a config dir.
    pub fn platform_default() -> Option<Self> {
        dirs::config_dir().map(|dir| Self::new(dir.join(APP_DIR).join(PREFERENCE_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable preferences read as `None`.
    pub fn load(&self) -> Option<Locale> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("Could not read {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_slice::<LocalePreference>(&raw) {
            Ok(preference) => Some(preference.locale),
            Err(e) => {
                log::warn!("Ignoring malformed locale preference {}: {}", self.path.display(), e);
                None
            }
        }
    }

    pub fn save(&self, locale: Locale) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_vec_pretty(&LocalePreference { locale })
            .map_err(|e| UpscaleError::Config(format!("Could not serialize locale: {}", e)))?;
        fs::write(&self.path, body)?;
        log::debug!("Saved locale {} to {}", locale, self.path.display());
        Ok(())
    }
}

/// Saved preference first, then the environment's language, then English.
pub fn resolve_locale<F>(store: Option<&LocaleStore>, lookup: F) -> Locale
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(saved) = store.and_then(LocaleStore::load) {
        return saved;
    }

    ["LC_ALL", "LANG"]
        .iter()
        .filter_map(|var| lookup(var))
        .find_map(|tag| Locale::from_language_tag(&tag))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_codes_and_language_tags() {
        assert_eq!("VI".parse::<Locale>().unwrap(), Locale::Vi);
        assert_eq!(Locale::from_language_tag("vi_VN.UTF-8"), Some(Locale::Vi));
        assert_eq!(Locale::from_language_tag("en-US"), Some(Locale::En));
        assert_eq!(Locale::from_language_tag("fr_FR"), None);
        assert!("de".parse::<Locale>().is_err());
    }

    #[test]
    fn size_notice_names_the_limit() {
        let notice = IntakeNotice::Oversized {
            name: "big.png".to_string(),
            limit_mb: 5,
        };
        for locale in Locale::ALL {
            let text = Catalog::new(locale).intake_notice(&notice);
            assert!(text.starts_with("big.png: "));
            assert!(text.contains("5MB"));
        }
    }

    #[test]
    fn every_status_has_a_label() {
        let statuses = [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Error,
        ];
        for locale in Locale::ALL {
            let catalog = Catalog::new(locale);
            for status in statuses {
                assert!(!catalog.status(status).is_empty());
            }
        }
        assert_eq!(Catalog::new(Locale::Vi).status(JobStatus::Error), "Lỗi");
    }

    #[test]
    fn job_errors_are_localized_by_kind() {
        let failure = JobFailure::from(&UpscaleError::ReadFailure("a.png: denied".to_string()));

        assert_eq!(
            Catalog::new(Locale::En).job_error(&failure),
            "Error: Failed to read the image file."
        );
        assert_eq!(
            Catalog::new(Locale::Vi).job_error(&failure),
            "Lỗi: Không thể đọc tệp hình ảnh."
        );

        let vi = Catalog::new(Locale::Vi);
        let unavailable = vi.error(&UpscaleError::service("connection reset"));
        assert!(unavailable.starts_with("Lỗi: "));
        assert!(!unavailable.contains("temporarily unavailable"));
        assert!(vi
            .error(&UpscaleError::OversizedFile { size: 9, limit_mb: 5 })
            .contains("dưới 5MB"));
    }

    #[test]
    fn unmapped_errors_fall_back_to_unknown() {
        assert_eq!(
            Catalog::default().error(&UpscaleError::BatchInProgress),
            "Error: An unknown error occurred during upscaling."
        );
    }

    #[test]
    fn store_round_trips_through_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocaleStore::new(dir.path().join("nested").join(PREFERENCE_FILE));

        assert_eq!(store.load(), None);
        store.save(Locale::Vi).unwrap();
        assert_eq!(store.load(), Some(Locale::Vi));

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"vi\""));
    }

    #[test]
    fn malformed_preference_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocaleStore::new(dir.path().join(PREFERENCE_FILE));
        fs::write(store.path(), "{ not json").unwrap();
        assert_eq!(store.load(), None);
    }

    #[test]
    fn saved_preference_beats_environment() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocaleStore::new(dir.path().join(PREFERENCE_FILE));
        let vietnamese = |var: &str| (var == "LANG").then(|| "vi_VN.UTF-8".to_string());

        assert_eq!(resolve_locale(Some(&store), vietnamese), Locale::Vi);
        assert_eq!(resolve_locale(None, |_| None), Locale::En);

        store.save(Locale::En).unwrap();
        assert_eq!(resolve_locale(Some(&store), vietnamese), Locale::En);
    }
}
