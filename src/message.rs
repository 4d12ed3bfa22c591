//! Per-message header boundary tracking.
//!
//! Lines arrive one at a time, still dot-stuffed. Candidate
//! `Authentication-Results` headers are held back until the next header
//! (or the end of the header section) shows they are complete; then they
//! are either dropped or forwarded verbatim.

use crate::cache::{unescape, HeaderCache};
use crate::config::Policy;
use crate::header::{self, HeaderVerdict};

/// Scan state for one message. Nothing in here outlives the message.
#[derive(Debug)]
pub struct MessageScan {
    session: u64,
    found_match: bool,
    errored: bool,
    in_header: bool,
    in_spam_marker: bool,
    parsing_headers: bool,
    cache: HeaderCache,
}

impl MessageScan {
    pub fn new(session: u64) -> Self {
        MessageScan {
            session,
            found_match: false,
            errored: false,
            in_header: false,
            in_spam_marker: false,
            parsing_headers: true,
            cache: HeaderCache::new(),
        }
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn found_match(&self) -> bool {
        self.found_match
    }

    pub fn errored(&self) -> bool {
        self.errored
    }

    pub fn parsing_headers(&self) -> bool {
        self.parsing_headers
    }

    /// Feed one data line. Every line that is not held back or dropped is
    /// passed to `forward` unchanged, escaping included.
    pub fn on_line<F: FnMut(&[u8])>(&mut self, raw: &[u8], policy: &Policy, mut forward: F) {
        if self.errored {
            if raw == b"." {
                forward(raw);
            }
            return;
        }

        if raw.is_empty() {
            self.parsing_headers = false;
        }
        let line = unescape(raw);
        let folded = matches!(line.first(), Some(b' ' | b'\t'));

        // a new field, or the blank line, completes the pending candidate
        if self.in_header && (!folded || !self.parsing_headers) {
            self.in_header = false;
            self.resolve(policy, &mut forward);
            if self.errored {
                if raw == b"." {
                    forward(raw);
                }
                return;
            }
        }
        if !folded {
            self.in_spam_marker = false;
        }

        if self.parsing_headers {
            if header::is_authentication_results(line) {
                self.in_header = true;
                self.buffer(raw);
                return;
            }
            if self.in_header && folded {
                self.buffer(raw);
                return;
            }
            if let Some(name_len) = policy.spam_marker_len(line) {
                log::debug!(
                    "{:016x} dropping spam marker header {}",
                    self.session,
                    String::from_utf8_lossy(&line[..name_len]).trim_end_matches([' ', '\t', ':'])
                );
                self.in_spam_marker = true;
                return;
            }
            if self.in_spam_marker && folded {
                return;
            }
        }

        forward(raw);
    }

    #[cfg(test)]
    pub(crate) fn mark_errored(&mut self) {
        self.errored = true;
    }

    fn buffer(&mut self, raw: &[u8]) {
        if let Err(e) = self.cache.append(raw) {
            self.fail(e);
        }
    }

    /// Decide on the buffered candidate header and release it.
    fn resolve<F: FnMut(&[u8])>(&mut self, policy: &Policy, forward: &mut F) {
        match header::evaluate(&self.cache, policy) {
            HeaderVerdict::Matched(id) => {
                log::debug!("{:016x} found Authentication-Results for '{id}'", self.session);
                self.found_match = true;
            }
            HeaderVerdict::NotMatched => self.cache.flush(&mut *forward),
            HeaderVerdict::Malformed(reason) => {
                log::debug!("{:016x} malformed Authentication-Results: {reason}", self.session);
                self.cache.flush(&mut *forward);
            }
            HeaderVerdict::AllocationFailed => self.fail(crate::cache::AllocationFailed),
        }
        self.cache.clear();
    }

    fn fail(&mut self, e: crate::cache::AllocationFailed) {
        self.cache.clear();
        self.errored = true;
        log::error!("{:016x} {e}", self.session);
    }
}
