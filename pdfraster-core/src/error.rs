use thiserror::Error;

#[derive(Error, Debug)]
pub enum RasterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Corrupt image data: {0}")]
    CorruptData(String),

    #[error("Filter {filter} cannot encode this image: {reason}")]
    IncompatibleFilter { filter: String, reason: String },

    #[error("Encoding error: {0}")]
    Encode(String),
}

impl RasterError {
    /// Shorthand for the explicit-filter rejection case.
    pub fn incompatible(filter: impl Into<String>, reason: impl Into<String>) -> Self {
        RasterError::IncompatibleFilter {
            filter: filter.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RasterError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_error_display() {
        let error = RasterError::UnsupportedFormat("not a raster image".to_string());
        assert_eq!(
            error.to_string(),
            "Unsupported image format: not a raster image"
        );

        let error = RasterError::CorruptData("truncated JPEG".to_string());
        assert_eq!(error.to_string(), "Corrupt image data: truncated JPEG");
    }

    #[test]
    fn test_incompatible_filter_display() {
        let error = RasterError::incompatible("CCITTFaxDecode", "image is not bilevel");
        assert_eq!(
            error.to_string(),
            "Filter CCITTFaxDecode cannot encode this image: image is not bilevel"
        );
    }

    #[test]
    fn test_error_from_io_error() {
        let io_error = IoError::new(ErrorKind::NotFound, "file not found");
        let error = RasterError::from(io_error);

        match error {
            RasterError::Io(ref err) => assert_eq!(err.kind(), ErrorKind::NotFound),
            _ => panic!("Expected IO error variant"),
        }
    }

    #[test]
    fn test_error_debug() {
        let error = RasterError::Encode("deflate failed".to_string());
        let debug_str = format!("{:?}", error);
        assert!(debug_str.contains("Encode"));
        assert!(debug_str.contains("deflate failed"));
    }

    #[test]
    fn test_all_error_variants_display() {
        let errors = vec![
            RasterError::UnsupportedFormat("format".to_string()),
            RasterError::CorruptData("data".to_string()),
            RasterError::incompatible("JPXDecode", "source is not JPEG 2000"),
            RasterError::Encode("encode".to_string()),
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }

    #[test]
    fn test_result_alias() {
        let ok: Result<u32> = Ok(7);
        assert_eq!(ok.unwrap(), 7);

        let err: Result<u32> = Err(RasterError::CorruptData("bad".to_string()));
        assert!(err.is_err());
    }

    #[test]
    fn test_error_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RasterError>();
    }
}
