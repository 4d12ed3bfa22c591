//! End-of-message verdict.

use crate::config::Policy;
use crate::header::FIELD_NAME;
use crate::message::MessageScan;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Proceed,
    Reject(String),
    Disconnect(String),
}

/// Pick the verdict for a committed message and log it.
pub fn decide(scan: &MessageScan, policy: &Policy) -> Verdict {
    let session = scan.session();
    let id = &policy.authserv_id;

    if scan.errored() {
        log::error!("{session:016x} Internal error while scanning message: disconnected");
        return Verdict::Disconnect("Internal server error".to_string());
    }

    if policy.reject && scan.found_match() {
        log::info!("{session:016x} Message contains {FIELD_NAME} header for authserv-id '{id}': rejected");
        return Verdict::Reject(format!(
            "Message contains {FIELD_NAME} header for authserv-id '{id}'"
        ));
    }

    if scan.found_match() {
        log::info!("{session:016x} Message contains {FIELD_NAME} header for authserv-id '{id}': filtered");
    } else if policy.verbose > 0 {
        log::info!("{session:016x} Message contains no {FIELD_NAME} header for authserv-id '{id}'");
    }
    Verdict::Proceed
}
