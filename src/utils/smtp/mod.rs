//! SMTP probing: sessions, the per-host state machine, and its results.

mod client;
mod error;
mod result;
mod session;

pub use client::{test_smtp_connectivity, SmtpProber};
pub use result::{HostAttempt, HostVerdict, ProbeStage, SmtpReply};
pub use session::{LettreConnector, SmtpConnector, SmtpSession};

#[cfg(test)]
pub(crate) use client::tests::{replies, HostScript, StubConnector};
