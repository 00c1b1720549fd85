//! Live-reload notifications.

use std::fmt;

/// Event pushed to connected browsers after a task wrote output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReloadKind {
    /// Reload the page.
    Reload,

    /// Re-request stylesheets without reloading.
    CssReload,
}

impl ReloadKind {
    /// Wire name of the event.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reload => "reload",
            Self::CssReload => "css-reload",
        }
    }
}

impl fmt::Display for ReloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver of reload notifications.
pub trait ReloadSink: Send + Sync {
    /// Signal that output changed.
    fn notify(&self, kind: ReloadKind);
}

/// Sink that drops every notification; used outside watch mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReload;

impl ReloadSink for NoopReload {
    fn notify(&self, _kind: ReloadKind) {}
}
