//! Result types recorded while probing a single mail host.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A numeric SMTP reply and its text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpReply {
    pub code: u16,
    pub message: String,
}

impl SmtpReply {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// 2xx replies.
    pub fn is_positive(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

impl fmt::Display for SmtpReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.message)
    }
}

/// How far a host session got before it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStage {
    Init,
    Connected,
    Greeted,
    Probed,
    SenderNegotiated,
    RecipientChecked,
}

/// What a single host said about a recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostVerdict {
    /// RCPT TO answered 250.
    Accepted,
    /// RCPT TO answered 550.
    Rejected,
    /// Anything else: transport failures, greylisting, policy replies.
    Inconclusive,
}

impl HostVerdict {
    pub fn is_conclusive(self) -> bool {
        !matches!(self, HostVerdict::Inconclusive)
    }
}

/// The record of one session against one mail host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostAttempt {
    pub host: String,
    pub stage: ProbeStage,
    pub verdict: HostVerdict,
    /// The sender the host accepted in `MAIL FROM`, if any.
    pub sender: Option<String>,
    /// The VRFY reply. Informational only, never decides the verdict.
    pub vrfy_reply: Option<SmtpReply>,
    /// The reply that decided the verdict, or the last one seen.
    pub last_reply: Option<SmtpReply>,
    pub note: String,
}

impl HostAttempt {
    pub(crate) fn started(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            stage: ProbeStage::Init,
            verdict: HostVerdict::Inconclusive,
            sender: None,
            vrfy_reply: None,
            last_reply: None,
            note: String::new(),
        }
    }

    /// Ends the attempt with a conclusive verdict from a RCPT TO reply.
    pub(crate) fn conclude(mut self, verdict: HostVerdict, reply: SmtpReply) -> Self {
        self.stage = ProbeStage::RecipientChecked;
        self.verdict = verdict;
        self.note = match verdict {
            HostVerdict::Accepted => format!("recipient accepted: {}", reply),
            HostVerdict::Rejected => format!("recipient rejected: {}", reply),
            HostVerdict::Inconclusive => format!("recipient reply inconclusive: {}", reply),
        };
        self.last_reply = Some(reply);
        self
    }

    /// Ends the attempt without a verdict.
    pub(crate) fn inconclusive(mut self, note: impl Into<String>) -> Self {
        self.verdict = HostVerdict::Inconclusive;
        self.note = note.into();
        self
    }

    pub(crate) fn with_reply(mut self, reply: SmtpReply) -> Self {
        self.last_reply = Some(reply);
        self
    }
}
