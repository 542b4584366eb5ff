//! Outbound mail contract.
//!
//! The application only composes mail; delivery belongs to an external
//! collaborator. `Mailer::send` is fire-and-forget: implementations must
//! never propagate delivery failures into the calling request flow.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tracing::warn;

/// A structured message handed to the delivery collaborator.
#[derive(Debug, Clone)]
pub struct OutboundMail {
    pub recipients: Vec<String>,
    pub subject: String,
    pub html_body: String,
}

pub trait Mailer: Send + Sync {
    fn send(&self, mail: OutboundMail);
}

/// Degraded-mode mailer used when no delivery backend is configured.
/// Drops every message, but observably: each drop is logged and counted.
#[derive(Default)]
pub struct DisabledMailer {
    dropped: AtomicU64,
}

impl DisabledMailer {
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Mailer for DisabledMailer {
    fn send(&self, mail: OutboundMail) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        warn!(
            subject = %mail.subject,
            recipients = mail.recipients.len(),
            "mail delivery disabled; dropping message"
        );
    }
}

/// Test double that records every message instead of delivering it.
#[derive(Default)]
pub struct CapturingMailer {
    sent: Mutex<Vec<OutboundMail>>,
}

impl CapturingMailer {
    pub fn take_sent(&self) -> Vec<OutboundMail> {
        std::mem::take(&mut self.sent.lock().unwrap())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl Mailer for CapturingMailer {
    fn send(&self, mail: OutboundMail) {
        self.sent.lock().unwrap().push(mail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> OutboundMail {
        OutboundMail {
            recipients: vec!["someone@example.com".to_string()],
            subject: "hello".to_string(),
            html_body: "<p>hi</p>".to_string(),
        }
    }

    #[test]
    fn test_disabled_mailer_counts_drops() {
        let mailer = DisabledMailer::default();
        mailer.send(sample());
        mailer.send(sample());
        assert_eq!(mailer.dropped(), 2);
    }

    #[test]
    fn test_capturing_mailer_records() {
        let mailer = CapturingMailer::default();
        mailer.send(sample());
        let sent = mailer.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "hello");
        assert_eq!(mailer.sent_count(), 0);
    }
}
