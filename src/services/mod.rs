//! Application services. Each one owns a use case end to end: it loads state
//! through the repository ports, lets the aggregates decide, persists, and
//! publishes the resulting events.

pub mod orders;
pub mod settlement;

pub use orders::{OrderService, Quote};
pub use settlement::{PaymentForm, PaymentResult, PaymentService, WebhookNotification, WebhookOutcome};

/// Compares a shared secret without short-circuiting on the first mismatch.
pub(crate) fn secrets_match(expected: &str, provided: &str) -> bool {
    if expected.len() != provided.len() { return false; }
    let mut diff = 0u8;
    for (a, b) in expected.as_bytes().iter().zip(provided.as_bytes()) { diff |= a ^ b; }
    diff == 0
}
