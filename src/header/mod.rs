pub mod reassemble;
pub mod scanner;

pub use reassemble::reassemble;
pub use scanner::{extract_authserv_id, NoAuthServId};

use crate::cache::HeaderCache;
use crate::config::Policy;

pub const FIELD_NAME: &str = "Authentication-Results";

/// Outcome of evaluating one buffered `Authentication-Results` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderVerdict {
    Matched(String),
    NotMatched,
    Malformed(&'static str),
    AllocationFailed,
}

/// True if `line` (already de-escaped) starts an `Authentication-Results`
/// header: the field name at column 0, any case, optional blanks, colon.
pub fn is_authentication_results(line: &[u8]) -> bool {
    let Some(name) = line.get(..FIELD_NAME.len()) else {
        return false;
    };
    if !name.eq_ignore_ascii_case(FIELD_NAME.as_bytes()) {
        return false;
    }
    line[FIELD_NAME.len()..]
        .iter()
        .find(|&&c| c != b' ' && c != b'\t')
        == Some(&b':')
}

pub fn evaluate(cache: &HeaderCache, policy: &Policy) -> HeaderVerdict {
    let value = match reassemble(cache) {
        Ok(value) => value,
        Err(_) => return HeaderVerdict::AllocationFailed,
    };

    match extract_authserv_id(&value) {
        // authserv-ids are host names; compare without regard to case
        Ok(id) if id.eq_ignore_ascii_case(&policy.authserv_id) => HeaderVerdict::Matched(id),
        Ok(id) => {
            log::debug!("authserv-id '{id}' does not match");
            HeaderVerdict::NotMatched
        }
        Err(NoAuthServId::Malformed(reason)) => HeaderVerdict::Malformed(reason),
        Err(e) => {
            log::debug!("no usable authserv-id: {e}");
            HeaderVerdict::NotMatched
        }
    }
}
