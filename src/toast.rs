// 🔔 Toasts - transient user-visible messages
//
// Every registry operation ends in exactly one toast: a success for a
// completed create/update/delete/switch, a failure for anything else.

use std::sync::{PoisonError, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub kind: ToastKind,
    pub message: String,
}

impl Toast {
    pub fn success(message: impl Into<String>) -> Self {
        Toast {
            kind: ToastKind::Success,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Toast {
            kind: ToastKind::Failure,
            message: message.into(),
        }
    }
}

/// Where toasts are shown
pub trait ToastSink: Send + Sync {
    fn show(&self, toast: Toast);
}

/// Writes toasts to the tracing log (server default)
#[derive(Debug, Default, Clone, Copy)]
pub struct LogToasts;

impl ToastSink for LogToasts {
    fn show(&self, toast: Toast) {
        match toast.kind {
            ToastKind::Success => tracing::info!(target: "toast", "{}", toast.message),
            ToastKind::Failure => tracing::warn!(target: "toast", "{}", toast.message),
        }
    }
}

/// Prints toasts for the CLI
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleToasts;

impl ToastSink for ConsoleToasts {
    fn show(&self, toast: Toast) {
        match toast.kind {
            ToastKind::Success => println!("✓ {}", toast.message),
            ToastKind::Failure => eprintln!("❌ {}", toast.message),
        }
    }
}

/// Keeps every toast in memory, for embedding UIs and tests
#[derive(Debug, Default)]
pub struct CollectedToasts {
    toasts: RwLock<Vec<Toast>>,
}

impl CollectedToasts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Toast> {
        self.toasts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, kind: ToastKind) -> usize {
        self.toasts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|t| t.kind == kind)
            .count()
    }

    /// Take everything shown so far
    pub fn drain(&self) -> Vec<Toast> {
        std::mem::take(&mut *self.toasts.write().unwrap_or_else(PoisonError::into_inner))
    }
}

impl ToastSink for CollectedToasts {
    fn show(&self, toast: Toast) {
        self.toasts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(toast);
    }
}
