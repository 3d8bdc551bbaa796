//! Billing-anchored quota engine: window arithmetic, counter
//! reservations, and the limit-reached notifier

pub mod notifier;
pub mod quota;
pub mod window;

pub use notifier::QuotaNotifier;
pub use quota::{QuotaDecision, QuotaEngine};
pub use window::{billing_window, BillingWindow};
