//! Error types for the Wayland integration layer.
//!
//! The taxonomy follows the layer's failure model: fatal bring-up errors
//! ([`ConnectError`]), per-window operation errors ([`WindowError`]) and
//! buffer backend errors ([`BackendError`]). Compositor protocol
//! violations are logged and skipped where they occur; they never
//! surface as panics.

use thiserror::Error;

/// Fatal errors while establishing the compositor connection.
///
/// None of these are recoverable: the connection is not created and the
/// caller receives the error directly.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The Wayland socket could not be opened at all.
    #[error("failed to connect to the Wayland display: {0}")]
    Display(#[from] wayland_client::ConnectError),

    /// The initial registry round-trip failed.
    #[error("global registry initialization failed: {0}")]
    Registry(#[from] wayland_client::globals::GlobalError),

    /// A required global never appeared in the registry.
    #[error("required global '{0}' not advertised by the compositor")]
    GlobalMissing(&'static str),

    /// The runtime configuration is invalid for this backend.
    #[error("configuration error: {0}")]
    Config(#[from] waylet_core::ConfigError),

    /// Protocol dispatch failed during bring-up.
    #[error("dispatch error during bring-up: {0}")]
    Dispatch(#[from] wayland_client::DispatchError),

    /// The DMABUF backend was requested but the compositor does not
    /// advertise the configured pixel format.
    #[error("DMABUF pixel format {0:#010x} not advertised by the compositor")]
    DmabufFormatMissing(u32),
}

/// Errors from per-window operations.
#[derive(Debug, Error)]
pub enum WindowError {
    /// The compositor never delivered the first configure event during
    /// the creation round-trip. Fatal to window creation.
    #[error("window did not receive its initial configure event")]
    InitialConfigure,

    /// The window id does not name a live window.
    #[error("unknown or closed window")]
    UnknownWindow,

    /// The window has not completed its configure cycle yet.
    #[error("window is not configured")]
    NotConfigured,

    /// A buffer backend call failed; the originating window operation
    /// was rolled back.
    #[error("buffer backend error: {0}")]
    Backend(#[from] BackendError),

    /// Protocol dispatch failed while servicing the operation.
    #[error("dispatch error: {0}")]
    Dispatch(#[from] wayland_client::DispatchError),
}

/// Errors from the buffer backends (SHM and DMABUF).
///
/// A failing backend call rolls back any partially created resources in
/// reverse order and leaves the previous buffer generation (if any)
/// untouched.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Creating or growing the anonymous SHM backing file failed.
    #[error("SHM backing file error: {0}")]
    BackingFile(#[source] std::io::Error),

    /// Mapping the backing file into the process failed.
    #[error("failed to map shared memory: {0}")]
    Map(#[source] std::io::Error),

    /// The requested buffer dimensions are not representable.
    #[error("invalid buffer dimensions {0}x{1}")]
    InvalidDimensions(i32, i32),

    /// The external DMABUF allocator could not produce a buffer.
    #[error("DMABUF allocation failed: {0}")]
    DmabufAllocation(String),

    /// The allocator returned more planes than the protocol maximum.
    #[error("DMABUF plane count {0} exceeds the maximum of {1}")]
    TooManyPlanes(usize, usize),

    /// No DMABUF allocator was installed on the context.
    #[error("DMABUF backend selected but no allocator installed")]
    NoAllocator,

    /// The backend session has no active buffer set.
    #[error("buffer backend not initialized")]
    NotInitialized,
}

/// Result alias used throughout this crate.
pub type Result<T, E = WindowError> = std::result::Result<T, E>;
