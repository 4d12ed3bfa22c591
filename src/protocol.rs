//! OpenSMTPD filter protocol framing (stdin/stdout, `|`-separated).

use crate::decision::Verdict;
use anyhow::{bail, Context};

/// Registrations sent in answer to `config|ready`.
pub const REGISTRATIONS: &[&str] = &[
    "register|report|smtp-in|tx-begin",
    "register|report|smtp-in|tx-reset",
    "register|report|smtp-in|tx-rollback",
    "register|report|smtp-in|tx-commit",
    "register|report|smtp-in|link-disconnect",
    "register|filter|smtp-in|data-line",
    "register|filter|smtp-in|commit",
    "register|ready",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event<'a> {
    ConfigReady,
    Config,
    Report { event: &'a str, session: u64 },
    DataLine { session: u64, token: &'a str, line: &'a [u8] },
    Commit { session: u64, token: &'a str },
}

/// Parse one input line, without its trailing newline. Only the protocol
/// fields have to be text; a data-line payload is carried as raw bytes.
pub fn parse(input: &[u8]) -> anyhow::Result<Event<'_>> {
    let display = String::from_utf8_lossy(input);
    let mut fields = input.splitn(8, |&b| b == b'|');
    let mut field = || text(fields.next());

    match field()? {
        Some("config") => match field()? {
            Some("ready") => Ok(Event::ConfigReady),
            Some(_) => Ok(Event::Config),
            None => bail!("invalid config line: {display}"),
        },
        Some(kind @ ("report" | "filter")) => {
            let _version = field()?;
            let _timestamp = field()?;
            match field()? {
                Some("smtp-in") => {}
                Some(subsystem) => bail!("unsupported subsystem {subsystem}: {display}"),
                None => bail!("truncated {kind} line: {display}"),
            }
            let (Some(phase), Some(session)) = (field()?, field()?) else {
                bail!("truncated {kind} line: {display}");
            };
            let session = parse_session(session)?;

            if kind == "report" {
                return Ok(Event::Report { event: phase, session });
            }

            let token = field()?.with_context(|| format!("missing token: {display}"))?;
            match phase {
                // the payload may itself contain '|'
                "data-line" => Ok(Event::DataLine {
                    session,
                    token,
                    line: fields
                        .next()
                        .with_context(|| format!("missing data line: {display}"))?,
                }),
                "commit" => Ok(Event::Commit { session, token }),
                _ => bail!("unregistered filter phase {phase}: {display}"),
            }
        }
        _ => bail!("unknown protocol line: {display}"),
    }
}

fn text(field: Option<&[u8]>) -> anyhow::Result<Option<&str>> {
    field
        .map(std::str::from_utf8)
        .transpose()
        .context("protocol field is not UTF-8")
}

fn parse_session(session: &str) -> anyhow::Result<u64> {
    u64::from_str_radix(session, 16).with_context(|| format!("invalid session id {session}"))
}

pub fn data_line(session: u64, token: &str, line: &[u8]) -> Vec<u8> {
    let mut out = format!("filter-dataline|{session:016x}|{token}|").into_bytes();
    out.extend_from_slice(line);
    out
}

pub fn filter_result(session: u64, token: &str, verdict: &Verdict) -> String {
    match verdict {
        Verdict::Proceed => format!("filter-result|{session:016x}|{token}|proceed"),
        Verdict::Reject(reason) => format!("filter-result|{session:016x}|{token}|reject|550 {reason}"),
        Verdict::Disconnect(reason) => {
            format!("filter-result|{session:016x}|{token}|disconnect|421 {reason}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        assert_eq!(parse(b"config|ready").unwrap(), Event::ConfigReady);
        assert_eq!(parse(b"config|smtpd-version|7.4.0").unwrap(), Event::Config);
        assert_eq!(parse(b"config|subsystem|smtp-in").unwrap(), Event::Config);
    }

    #[test]
    fn test_parse_report() {
        assert_eq!(
            parse(b"report|0.7|1576146008.006099|smtp-in|tx-begin|7641df9771b4ed00|1ef1c203").unwrap(),
            Event::Report { event: "tx-begin", session: 0x7641df9771b4ed00 }
        );
        assert_eq!(
            parse(b"report|0.7|1576146008.006099|smtp-in|link-disconnect|0000000000000001").unwrap(),
            Event::Report { event: "link-disconnect", session: 1 }
        );
    }

    #[test]
    fn test_parse_data_line_keeps_pipes() {
        assert_eq!(
            parse(b"filter|0.7|1576146008.006099|smtp-in|data-line|7641df9771b4ed00|1ef1c203cc576e5d|a|b||c")
                .unwrap(),
            Event::DataLine {
                session: 0x7641df9771b4ed00,
                token: "1ef1c203cc576e5d",
                line: b"a|b||c"
            }
        );
        assert_eq!(
            parse(b"filter|0.7|1.0|smtp-in|data-line|01|02|").unwrap(),
            Event::DataLine { session: 1, token: "02", line: b"" }
        );
    }

    #[test]
    fn test_parse_eight_bit_data_line() {
        assert_eq!(
            parse(b"filter|0.7|1.0|smtp-in|data-line|01|02|Gr\xfc\xdfe|\xff").unwrap(),
            Event::DataLine { session: 1, token: "02", line: b"Gr\xfc\xdfe|\xff" }
        );
        // only the payload may be arbitrary bytes
        assert!(parse(b"filter|0.7|1.0|smtp-in|data-line|01|\xff|x").is_err());
    }

    #[test]
    fn test_parse_commit() {
        assert_eq!(
            parse(b"filter|0.7|1.0|smtp-in|commit|7641df9771b4ed00|1ef1c203cc576e5d").unwrap(),
            Event::Commit { session: 0x7641df9771b4ed00, token: "1ef1c203cc576e5d" }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse(b"").is_err());
        assert!(parse(b"bogus|line").is_err());
        assert!(parse(b"filter|0.7|1.0|smtp-out|commit|01|02").is_err());
        assert!(parse(b"filter|0.7|1.0|smtp-in|commit|zz|02").is_err());
        assert!(parse(b"filter|0.7|1.0|smtp-in|commit|01").is_err());
        assert!(parse(b"filter|0.7|1.0|smtp-in|data-line|01|02").is_err());
        assert!(parse(b"filter|0.7|1.0|smtp-in|helo|01|02|x").is_err());
    }

    #[test]
    fn test_format_responses() {
        assert_eq!(data_line(1, "ab", b"..x"), b"filter-dataline|0000000000000001|ab|..x");
        assert_eq!(data_line(1, "ab", b"\xe9"), b"filter-dataline|0000000000000001|ab|\xe9");
        assert_eq!(
            filter_result(0x10, "ab", &Verdict::Proceed),
            "filter-result|0000000000000010|ab|proceed"
        );
        assert_eq!(
            filter_result(0x10, "ab", &Verdict::Reject("no".to_string())),
            "filter-result|0000000000000010|ab|reject|550 no"
        );
        assert_eq!(
            filter_result(0x10, "ab", &Verdict::Disconnect("Internal server error".to_string())),
            "filter-result|0000000000000010|ab|disconnect|421 Internal server error"
        );
    }
}
