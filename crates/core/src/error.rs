//! Error types shared across the demo.

use thiserror::Error;

/// Top-level error type for the demo.
#[derive(Error, Debug)]
pub enum Error {
    /// Vulkan-related errors
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// Asset loading errors (texture, SPIR-V blob)
    #[error("Asset error: {0}")]
    Asset(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Process exit code for this error category.
    ///
    /// Each initialization stage exits with a distinct code so a failure
    /// is identifiable from the shell without parsing logs.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Window(_) => 102,
            Error::Vulkan(_) => 103,
            Error::Asset(_) | Error::Io(_) => 104,
            Error::Internal(_) => 101,
        }
    }
}

/// Result type alias using the demo's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_per_stage() {
        let window = Error::Window("x".into()).exit_code();
        let vulkan = Error::Vulkan("x".into()).exit_code();
        let asset = Error::Asset("x".into()).exit_code();
        assert_ne!(window, vulkan);
        assert_ne!(vulkan, asset);
        assert_ne!(window, asset);
    }

    #[test]
    fn test_io_errors_count_as_asset_failures() {
        let io = Error::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(io.exit_code(), Error::Asset("gone".into()).exit_code());
    }
}
