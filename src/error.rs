use thiserror::Error;

/// Errors surfaced by device construction. Resource-level failures are not
/// propagated by value; they are logged and reported in-band as null
/// handles, because at this layer a failed create is either fatal or
/// handled by the caller checking handle validity at the use site.
#[derive(Debug, Error)]
pub enum GraphicsError {
    #[error("no suitable graphics device found")]
    NoSuitableDevice,

    #[error("required extension missing: {0}")]
    MissingExtension(String),

    #[error("backend not supported on this platform: {0}")]
    BackendUnavailable(&'static str),

    #[error(transparent)]
    Init(#[from] anyhow::Error),
}

/// Reason a physical device was rejected during adapter selection.
#[derive(Debug, Error)]
#[error("Suitability error: {0}.")]
pub struct SuitabilityError(pub &'static str);
