use crate::cache::{unescape, AllocationFailed, HeaderCache};

const CRLF: &[u8] = b"\r\n";

/// Join the buffered lines of one header into its logical value, keeping
/// the CRLF at every fold so the scanner sees folding whitespace.
pub fn reassemble(cache: &HeaderCache) -> Result<Vec<u8>, AllocationFailed> {
    let capacity = cache.cached_len() + 2 * cache.len() + 1;
    let mut value = Vec::new();
    value.try_reserve_exact(capacity)?;

    for (i, raw) in cache.lines().enumerate() {
        let line = unescape(raw);
        let sep = if i == 0 { 0 } else { CRLF.len() };
        if value.len() + sep + line.len() > capacity {
            overrun(capacity, value.len() + sep + line.len());
        }
        if i > 0 {
            value.extend_from_slice(CRLF);
        }
        value.extend_from_slice(line);
    }

    Ok(value)
}

/// The cache length bookkeeping is wrong. Continuing would mean trusting
/// a buffer size we know to be incorrect.
#[cold]
fn overrun(capacity: usize, needed: usize) -> ! {
    log::error!("header reassembly overrun: need {needed} bytes, sized for {capacity}");
    std::process::abort();
}
