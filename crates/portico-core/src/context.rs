//! Per-call execution context.

use std::time::Duration;

/// Caller-supplied constraints for one invocation.
///
/// Dropping the future returned by `Function::call` aborts the in-flight
/// work where the transport supports it (the network transport cancels the
/// outstanding request; the script transport signals cooperative
/// termination).
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    timeout: Option<Duration>,
}

impl CallContext {
    /// A context with no caller deadline; transports fall back to their
    /// configured default timeout.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The deadline this call runs under: the caller's, else the transport
    /// default.
    pub fn effective_timeout(&self, default: Duration) -> Duration {
        self.timeout.unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_timeout_wins_over_default() {
        let ctx = CallContext::with_timeout(Duration::from_millis(50));
        assert_eq!(
            ctx.effective_timeout(Duration::from_secs(30)),
            Duration::from_millis(50)
        );
        assert_eq!(
            CallContext::background().effective_timeout(Duration::from_secs(30)),
            Duration::from_secs(30)
        );
    }
}
