//! Outbound notifications to customers.

pub mod email;

pub use email::Mailer;
