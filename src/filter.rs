use crate::config::Policy;
use crate::decision::{decide, Verdict};
use crate::message::MessageScan;
use crate::protocol::{self, Event};
use std::collections::HashMap;
use std::sync::Arc;

/// Routes protocol events to the scan state of the message they belong to.
pub struct FilterEngine {
    policy: Arc<Policy>,
    messages: HashMap<u64, MessageScan>,
}

impl FilterEngine {
    pub fn new(policy: Arc<Policy>) -> Self {
        FilterEngine {
            policy,
            messages: HashMap::new(),
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Messages currently being scanned.
    pub fn active_messages(&self) -> usize {
        self.messages.len()
    }

    /// Handle one input line, appending any response lines to `out`.
    /// Data-line payloads are forwarded byte for byte.
    pub fn handle(&mut self, input: &[u8], out: &mut Vec<Vec<u8>>) -> anyhow::Result<()> {
        match protocol::parse(input)? {
            Event::ConfigReady => {
                log::debug!("registering with smtpd");
                out.extend(protocol::REGISTRATIONS.iter().map(|r| r.as_bytes().to_vec()));
            }
            Event::Config => {}
            Event::Report { event, session } => self.report(event, session),
            Event::DataLine { session, token, line } => {
                let policy = &self.policy;
                let scan = self.messages.entry(session).or_insert_with(|| {
                    log::debug!("{session:016x} data without tx-begin, starting message");
                    MessageScan::new(session)
                });
                scan.on_line(line, policy, |raw| {
                    out.push(protocol::data_line(session, token, raw))
                });
            }
            Event::Commit { session, token } => {
                let verdict = match self.messages.remove(&session) {
                    Some(scan) => decide(&scan, &self.policy),
                    None => {
                        log::debug!("{session:016x} commit for unknown message");
                        Verdict::Proceed
                    }
                };
                out.push(protocol::filter_result(session, token, &verdict).into_bytes());
            }
        }
        Ok(())
    }

    fn report(&mut self, event: &str, session: u64) {
        match event {
            "tx-begin" => {
                log::debug!("{session:016x} new message");
                self.messages.insert(session, MessageScan::new(session));
            }
            "tx-reset" | "tx-rollback" | "tx-commit" | "link-disconnect" => {
                if self.messages.remove(&session).is_some() {
                    log::debug!("{session:016x} message discarded on {event}");
                }
            }
            _ => {}
        }
    }
}
