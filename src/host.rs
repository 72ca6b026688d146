//! Host application primitives the session depends on

use std::path::{Path, PathBuf};

use crate::error::HostError;

/// The authoring application that owns the active document.
///
/// Implementations are black boxes to the session: it only relies on the
/// pre/post-conditions documented on each method.
pub trait Host {
    /// Absolute path of the active document, `None` if it was never saved
    fn active_file(&self) -> Option<PathBuf>;

    /// Flush the in-memory document and its embedded resources to the active file
    fn save(&mut self) -> Result<(), HostError>;

    /// Replace the in-memory document with the on-disk active file, discarding unsaved state
    fn discard_and_reload(&mut self) -> Result<(), HostError>;

    /// Make `path` the active document
    fn open(&mut self, path: &Path) -> Result<(), HostError>;

    /// Show or hide a wait indicator around long-running commands
    fn set_busy(&mut self, _busy: bool) {}
}

impl<H: Host + ?Sized> Host for &mut H {
    fn active_file(&self) -> Option<PathBuf> {
        (**self).active_file()
    }

    fn save(&mut self) -> Result<(), HostError> {
        (**self).save()
    }

    fn discard_and_reload(&mut self) -> Result<(), HostError> {
        (**self).discard_and_reload()
    }

    fn open(&mut self, path: &Path) -> Result<(), HostError> {
        (**self).open(path)
    }

    fn set_busy(&mut self, busy: bool) {
        (**self).set_busy(busy)
    }
}
