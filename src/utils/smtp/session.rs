//! Blocking SMTP sessions behind small traits so the probe logic can be driven
//! against a real server or a scripted stub.

use super::error::reply_from_error;
use super::result::SmtpReply;
use crate::core::error::{AppError, Result};
use crate::core::models::MailHost;

use lettre::transport::smtp::client::SmtpConnection;
use lettre::transport::smtp::commands::{Ehlo, Mail, Rcpt, Rset, Vrfy};
use lettre::transport::smtp::extension::ClientId;
use lettre::transport::smtp::response::Response;
use lettre::Address;
use std::net::ToSocketAddrs;
use std::str::FromStr;
use std::time::Duration;

/// One open conversation with a mail host. All calls block.
pub trait SmtpSession: Send {
    fn greet(&mut self) -> Result<SmtpReply>;
    fn verify(&mut self, address: &str) -> Result<SmtpReply>;
    fn mail_from(&mut self, sender: &str) -> Result<SmtpReply>;
    fn rcpt_to(&mut self, recipient: &str) -> Result<SmtpReply>;
    fn reset(&mut self) -> Result<SmtpReply>;
    fn quit(&mut self) -> Result<()>;

    /// Caps how long the next command may block. Sessions without a socket ignore it.
    fn limit_command_time(&mut self, _limit: Duration) -> Result<()> {
        Ok(())
    }
}

/// Opens sessions to mail hosts.
pub trait SmtpConnector: Send + Sync {
    fn connect(&self, host: &MailHost) -> Result<Box<dyn SmtpSession>>;
}

/// Sends `QUIT` when dropped, whichever way the session ended.
pub(crate) struct ScopedSession {
    inner: Box<dyn SmtpSession>,
    host: String,
}

impl ScopedSession {
    pub(crate) fn new(inner: Box<dyn SmtpSession>, host: impl Into<String>) -> Self {
        Self {
            inner,
            host: host.into(),
        }
    }
}

impl std::ops::Deref for ScopedSession {
    type Target = dyn SmtpSession;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl std::ops::DerefMut for ScopedSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.as_mut()
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        if let Err(e) = self.inner.quit() {
            tracing::debug!(target: "smtp_task", "QUIT to {} failed: {}", self.host, e);
        }
    }
}

/// Plain-text port-25 sessions over lettre's low-level connection.
#[derive(Debug, Clone)]
pub struct LettreConnector {
    port: u16,
    timeout: Duration,
    helo: ClientId,
}

impl LettreConnector {
    pub fn new(port: u16, timeout: Duration, helo_name: &str) -> Self {
        Self {
            port,
            timeout,
            helo: ClientId::Domain(helo_name.to_string()),
        }
    }
}

impl SmtpConnector for LettreConnector {
    fn connect(&self, host: &MailHost) -> Result<Box<dyn SmtpSession>> {
        let socket_addr = (host.hostname(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                AppError::transport(host.hostname(), "could not resolve mail server address")
            })?;

        tracing::debug!(target: "smtp_task",
            "Connecting to {} at {}", host, socket_addr);

        let conn = SmtpConnection::connect(socket_addr, Some(self.timeout), &self.helo, None, None)
            .map_err(|e| AppError::transport(host.hostname(), describe_connect_error(&e)))?;

        Ok(Box::new(LettreSession {
            conn,
            helo: self.helo.clone(),
            timeout: self.timeout,
        }))
    }
}

fn describe_connect_error(error: &lettre::transport::smtp::Error) -> String {
    let text = error.to_string();
    let lower = text.to_lowercase();
    if lower.contains("timed out")
        || lower.contains("connection refused")
        || lower.contains("network is unreachable")
    {
        format!("{} (outbound port 25 may be blocked)", text)
    } else {
        text
    }
}

struct LettreSession {
    conn: SmtpConnection,
    helo: ClientId,
    timeout: Duration,
}

impl LettreSession {
    /// Negative replies come back from lettre as errors; turn both arms into a reply.
    fn run<C: std::fmt::Display>(&mut self, command: C) -> Result<SmtpReply> {
        match self.conn.command(command) {
            Ok(response) => Ok(reply_from_response(&response)),
            Err(e) => reply_from_error(&e).ok_or(AppError::Smtp(e)),
        }
    }
}

impl SmtpSession for LettreSession {
    fn greet(&mut self) -> Result<SmtpReply> {
        let helo = self.helo.clone();
        self.run(Ehlo::new(helo))
    }

    fn verify(&mut self, address: &str) -> Result<SmtpReply> {
        self.run(Vrfy::new(address.to_string()))
    }

    fn mail_from(&mut self, sender: &str) -> Result<SmtpReply> {
        let sender = parse_address(sender)?;
        self.run(Mail::new(Some(sender), vec![]))
    }

    fn rcpt_to(&mut self, recipient: &str) -> Result<SmtpReply> {
        let recipient = parse_address(recipient)?;
        self.run(Rcpt::new(recipient, vec![]))
    }

    fn reset(&mut self) -> Result<SmtpReply> {
        self.run(Rset)
    }

    fn quit(&mut self) -> Result<()> {
        self.conn.quit()?;
        Ok(())
    }

    fn limit_command_time(&mut self, limit: Duration) -> Result<()> {
        self.conn.set_timeout(Some(self.timeout.min(limit)))?;
        Ok(())
    }
}

fn parse_address(raw: &str) -> Result<Address> {
    Address::from_str(raw)
        .map_err(|e| AppError::transport(raw, format!("not a valid address: {}", e)))
}

fn reply_from_response(response: &Response) -> SmtpReply {
    SmtpReply::new(
        response.code().to_string().parse().unwrap_or(0),
        response.message().collect::<Vec<&str>>().join(" "),
    )
}
