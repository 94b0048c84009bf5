//! Engine-wide error classification
//!
//! Every operation exposes its own error enum (see the per-command and
//! per-query modules); what they share is the caller contract: a failure is
//! either permanently blocked (a business rule or bad input; retrying the
//! same call cannot succeed) or transient (nothing was committed and the
//! same call may succeed on retry). Callers branch on this to decide
//! between surfacing a message and retrying silently, so the distinction is
//! preserved end to end rather than flattened into a generic failure.

/// Classification of an operation error as transient or permanent.
pub trait Retryable {
    /// `true` when the operation left no partial state behind and may be
    /// retried as-is (guard-check failures, detected races, aborted
    /// transactions). `false` for business-rule refusals and invalid input.
    fn is_retryable(&self) -> bool;
}
