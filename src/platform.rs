use crate::up::UpPrompt;

/// Outcome of a user-presence prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpDecision {
    Accepted,
    Denied,
    Timeout,
}

/// Capabilities the embedder injects into the core: randomness, a monotonic
/// clock, persistence for the public blob, and the user-presence prompt.
///
/// The core performs no I/O of its own; every handler runs synchronously on
/// top of these five calls. `millis` may wrap (deltas are computed with
/// `wrapping_sub`).
pub trait Platform {
    fn rand_bytes(&mut self, buf: &mut [u8]);
    fn millis(&mut self) -> u32;
    /// Previously stored public blob, if any. `None` triggers a factory reset.
    fn load(&mut self) -> Option<Vec<u8>>;
    fn store(&mut self, blob: &[u8]);
    fn request_user_presence(&mut self, prompt: &UpPrompt) -> UpDecision;
}
