//! Session timing and sizing parameters.

use std::time::Duration;

/// Default token width in bytes.
pub const DEFAULT_TOKEN_LEN: usize = 32;

/// Default lifetime of a relay token (deadline armed after leg 1).
pub const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default lifetime of a proved session (deadline armed after leg 3).
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Default guard factor applied to both lifetimes.
///
/// Deadlines are armed slightly early so the client reconnects before
/// the relay actually expires the session.
pub const DEFAULT_GUARD_FACTOR: f64 = 0.9;

/// Parameters of one relay session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Width of the client token in bytes.
    pub token_len: usize,
    /// Relay-token lifetime before guard scaling.
    pub token_timeout: Duration,
    /// Session lifetime before guard scaling.
    pub session_timeout: Duration,
    /// Fraction of each lifetime actually used, in `(0, 1]`.
    pub guard_factor: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_len: DEFAULT_TOKEN_LEN,
            token_timeout: DEFAULT_TOKEN_TIMEOUT,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            guard_factor: DEFAULT_GUARD_FACTOR,
        }
    }
}

impl SessionConfig {
    /// Token lifetime with the guard applied.
    pub fn guarded_token_timeout(&self) -> Duration {
        self.token_timeout.mul_f64(self.guard_factor)
    }

    /// Session lifetime with the guard applied.
    pub fn guarded_session_timeout(&self) -> Duration {
        self.session_timeout.mul_f64(self.guard_factor)
    }
}
