//! Crate-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("index error: {0}")]
    Index(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn config_error_display() {
        let e = AppError::Config("missing field".into());
        assert!(e.to_string().contains("config error"));
        assert!(e.to_string().contains("missing field"));
    }

    #[test]
    fn stream_error_display() {
        let e = AppError::Stream("source hung up".into());
        assert!(e.to_string().contains("source hung up"));
    }

    #[test]
    fn index_error_display() {
        let e = AppError::Index("fts insert failed".into());
        assert!(e.to_string().contains("fts insert failed"));
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let e: AppError = io_err.into();
        assert!(e.to_string().contains("io error"));
        // satisfies std::error::Error trait
        let _: &dyn Error = &e;
    }
}
