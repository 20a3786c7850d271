//! Confirmation gate for destructive bulk actions.

/// Synchronous yes/no decision supplied by the caller.
pub trait Confirm: Send + Sync {
    /// Returns `true` when the user accepts `prompt`.
    fn confirm(&self, prompt: &str) -> bool;
}

/// Accepts every prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysConfirm;

impl Confirm for AlwaysConfirm {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

/// Declines every prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverConfirm;

impl Confirm for NeverConfirm {
    fn confirm(&self, _prompt: &str) -> bool {
        false
    }
}
