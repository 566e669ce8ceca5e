/// Classification for retry policy.
///
/// Used by the failover executor to decide what happens after a provider call fails.
///
/// # Behavior Summary
///
/// | Class | Retry same provider? | Credential penalty? | Next provider? |
/// |-------|---------------------|---------------------|----------------|
/// | `WithBackoff` | Yes, same credential | Counted failure | After retries |
/// | `Cooldown` | Yes, with another credential | Immediate cooldown | When no credential is left |
/// | `NextProvider` | No | No | Yes |
/// | `Never` | No | No | No |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Transient failure (timeout, 5xx, malformed payload).
    ///
    /// Retried against the same provider and credential with exponential backoff.
    /// Every attempt counts as a failure for the credential; once the failure
    /// threshold is crossed the credential cools down and the next attempt
    /// leases a different one.
    WithBackoff,

    /// The credential itself is spent (quota exhausted, rejected key).
    ///
    /// The credential is put into cooldown right away. Remaining attempts use
    /// another credential of the same provider if one is available.
    Cooldown,

    /// This provider cannot serve the request, another one might.
    /// No credential penalty is recorded.
    NextProvider,

    /// Terminal - stop walking the chain.
    Never,
}
