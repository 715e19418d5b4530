use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FxError {
    #[error("Invalid LUT '{name}': {message}")]
    LutParse { name: String, message: String },

    #[error("Asset not found: {name}")]
    AssetNotFound { name: String },

    #[error("Compute kernel '{kernel}' unavailable: {message}")]
    KernelUnavailable { kernel: &'static str, message: String },

    #[error("GPU processing error: {message}")]
    Gpu { message: String },

    #[error("Could not encode image '{path}': {message}")]
    EncodeFailed { path: PathBuf, message: String },

    #[error("No permission to save: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("Unsupported export format: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("Invalid edit state: {message}")]
    InvalidEditState { message: String },

    #[error("Settings error: {message}")]
    Settings { message: String },

    #[error("Worker stopped: {worker}")]
    WorkerStopped { worker: &'static str },

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("JSON parsing error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, FxError>;

impl FxError {
    /// Classifies an encoder failure for `path`, separating permission denial from everything else.
    pub fn from_export(path: &Path, err: image::ImageError) -> Self {
        match &err {
            image::ImageError::IoError(io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
                FxError::PermissionDenied { path: path.to_path_buf() }
            }
            _ => FxError::EncodeFailed {
                path: path.to_path_buf(),
                message: err.to_string(),
            },
        }
    }

    /// Same classification for plain IO failures on the export destination.
    pub fn from_export_io(path: &Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            FxError::PermissionDenied { path: path.to_path_buf() }
        } else {
            FxError::EncodeFailed {
                path: path.to_path_buf(),
                message: err.to_string(),
            }
        }
    }

    /// Only export-path failures reach the end user; everything else degrades to a no-op stage.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            FxError::EncodeFailed { .. } | FxError::PermissionDenied { .. } | FxError::UnsupportedFormat { .. }
        )
    }

    /// Returns true if the user can reasonably retry the operation
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FxError::PermissionDenied { .. }
                | FxError::Io { .. }
                | FxError::Gpu { .. }
                | FxError::KernelUnavailable { .. }
        )
    }

    /// Returns a user-friendly error message with a recovery suggestion
    pub fn user_message(&self) -> String {
        let base_message = self.to_string();
        let suggestion = match self {
            FxError::EncodeFailed { .. } => "The image could not be encoded. Try a different format or a smaller size.",
            FxError::PermissionDenied { .. } => "Choose a folder you have permission to write to.",
            FxError::UnsupportedFormat { .. } => "Export as .jpg or .png instead.",
            FxError::LutParse { .. } => "The color look file is damaged. The photo was left ungraded.",
            FxError::AssetNotFound { .. } => "A required asset is missing. The effect was skipped.",
            FxError::Gpu { .. } | FxError::KernelUnavailable { .. } => {
                "GPU processing failed. Effects will fall back to CPU processing, which may be slower."
            }
            FxError::Io { .. } => "File system error occurred. Check disk space and permissions.",
            _ => "An unexpected error occurred.",
        };

        format!("{}\n\n{}", base_message, suggestion)
    }

    /// Returns an error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            FxError::LutParse { .. } => "LUT_PARSE_ERROR",
            FxError::AssetNotFound { .. } => "ASSET_NOT_FOUND",
            FxError::KernelUnavailable { .. } => "KERNEL_UNAVAILABLE",
            FxError::Gpu { .. } => "GPU_ERROR",
            FxError::EncodeFailed { .. } => "ENCODE_FAILED",
            FxError::PermissionDenied { .. } => "PERMISSION_DENIED",
            FxError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            FxError::InvalidEditState { .. } => "INVALID_EDIT_STATE",
            FxError::Settings { .. } => "SETTINGS_ERROR",
            FxError::WorkerStopped { .. } => "WORKER_STOPPED",
            FxError::Io { .. } => "IO_ERROR",
            FxError::Json { .. } => "JSON_ERROR",
        }
    }

    /// Logs a degraded stage; these never surface to the user mid-edit.
    pub fn log_degraded(&self, stage: &str) {
        tracing::warn!(stage, code = self.error_code(), "{}", self);
    }
}

impl From<anyhow::Error> for FxError {
    fn from(err: anyhow::Error) -> Self {
        FxError::Gpu { message: format!("{:#}", err) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_errors_are_distinguished() {
        let path = Path::new("/tmp/out.jpg");
        let denied = FxError::from_export_io(path, std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert_eq!(denied.error_code(), "PERMISSION_DENIED");
        assert!(denied.user_message().contains("permission"));

        let wrapped = image::ImageError::IoError(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert!(matches!(FxError::from_export(path, wrapped), FxError::PermissionDenied { .. }));

        let other = FxError::from_export_io(path, std::io::Error::from(std::io::ErrorKind::InvalidData));
        assert_eq!(other.error_code(), "ENCODE_FAILED");
        assert!(other.user_message().contains("could not be encoded"));
    }

    #[test]
    fn only_export_failures_are_user_facing() {
        let lut = FxError::LutParse { name: "x.cube".into(), message: "bad".into() };
        assert!(!lut.is_user_facing());
        let enc = FxError::EncodeFailed { path: PathBuf::from("a.png"), message: "boom".into() };
        assert!(enc.is_user_facing());
    }
}
