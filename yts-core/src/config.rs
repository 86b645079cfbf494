//! Client configuration, passed explicitly into constructors.

use crate::correlate::DEFAULT_INVOCATION_TIMEOUT_TICKS;

/// Tunables for the protocol core. No ambient globals; the host builds one
/// and threads it through `YtsClient::new`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Ticks before a pending invocation is resolved as timed out.
    /// The host drives ticks; nominal rate is 1 Hz.
    pub invocation_timeout_ticks: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            invocation_timeout_ticks: DEFAULT_INVOCATION_TIMEOUT_TICKS,
        }
    }
}
