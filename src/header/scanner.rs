//! Lenient CFWS / comment / quoted-string scanning of a reassembled
//! `Authentication-Results` value.
//!
//! The grammar is read loosely on purpose: a header that is almost well
//! formed is still checked, and anything we cannot make sense of ends up
//! as "no authserv-id", never as a match.

use super::FIELD_NAME;
use crate::config::MAX_AUTHSERV_ID_LEN;
use std::fmt;

/// Why no authserv-id could be taken from a header value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoAuthServId {
    /// Ran off the end of the value looking for a construct.
    Malformed(&'static str),
    /// Quoted string hit a line break or the end before its closing quote.
    Unterminated,
    /// Longer than `MAX_AUTHSERV_ID_LEN`.
    Oversized,
    Empty,
}

impl fmt::Display for NoAuthServId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoAuthServId::Malformed(reason) => write!(f, "malformed header: {reason}"),
            NoAuthServId::Unterminated => f.write_str("unterminated quoted authserv-id"),
            NoAuthServId::Oversized => f.write_str("authserv-id too long"),
            NoAuthServId::Empty => f.write_str("empty authserv-id"),
        }
    }
}

impl std::error::Error for NoAuthServId {}

/// Extract the authserv-id from a full header (`Authentication-Results:`
/// included, folds kept as CRLF).
pub fn extract_authserv_id(value: &[u8]) -> Result<String, NoAuthServId> {
    let mut cursor = Cursor::new(value);

    cursor.skip_field_name()?;
    cursor.skip_cfws()?;

    let token = match cursor.peek() {
        None => return Err(NoAuthServId::Malformed("no authserv-id before end of header")),
        Some(b'"') => cursor.quoted_string()?,
        Some(_) => cursor.token()?,
    };

    if token.is_empty() {
        return Err(NoAuthServId::Empty);
    }
    String::from_utf8(token).map_err(|_| NoAuthServId::Malformed("authserv-id is not UTF-8"))
}

struct Cursor<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a [u8]) -> Self {
        Cursor { input, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_while<P: Fn(u8) -> bool>(&mut self, pred: P) {
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
    }

    fn skip_field_name(&mut self) -> Result<(), NoAuthServId> {
        let name = self
            .input
            .get(..FIELD_NAME.len())
            .ok_or(NoAuthServId::Malformed("truncated field name"))?;
        if !name.eq_ignore_ascii_case(FIELD_NAME.as_bytes()) {
            return Err(NoAuthServId::Malformed("not an Authentication-Results header"));
        }
        self.pos = FIELD_NAME.len();
        self.skip_while(is_wsp);
        match self.bump() {
            Some(b':') => Ok(()),
            _ => Err(NoAuthServId::Malformed("missing colon after field name")),
        }
    }

    /// Any run of folding whitespace and (nested) comments. Repeated folds
    /// are tolerated.
    fn skip_cfws(&mut self) -> Result<(), NoAuthServId> {
        loop {
            self.skip_while(is_fws);
            if self.peek() != Some(b'(') {
                return Ok(());
            }
            self.skip_comment()?;
        }
    }

    fn skip_comment(&mut self) -> Result<(), NoAuthServId> {
        self.pos += 1;
        let mut depth = 1usize;

        while depth > 0 {
            match self.bump() {
                None => return Err(NoAuthServId::Malformed("unterminated comment")),
                // a quoted-pair may hide a parenthesis
                Some(b'\\') => {
                    if self.bump().is_none() {
                        return Err(NoAuthServId::Malformed("quoted-pair at end of header"));
                    }
                }
                Some(b'"') => self.skip_quoted_in_comment()?,
                Some(b'(') => depth += 1,
                Some(b')') => depth -= 1,
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn skip_quoted_in_comment(&mut self) -> Result<(), NoAuthServId> {
        loop {
            match self.bump() {
                None => return Err(NoAuthServId::Malformed("unterminated quoted string in comment")),
                Some(b'"') => return Ok(()),
                Some(b'\\') => {
                    if self.bump().is_none() {
                        return Err(NoAuthServId::Malformed("quoted-pair at end of header"));
                    }
                }
                Some(_) => {}
            }
        }
    }

    fn quoted_string(&mut self) -> Result<Vec<u8>, NoAuthServId> {
        self.pos += 1;
        let mut token = Vec::new();

        loop {
            let c = match self.bump() {
                None | Some(b'\r') | Some(b'\n') => return Err(NoAuthServId::Unterminated),
                Some(b'"') => return Ok(token),
                Some(b'\\') => match self.bump() {
                    None | Some(b'\r') | Some(b'\n') => return Err(NoAuthServId::Unterminated),
                    Some(c) => c,
                },
                Some(c) => c,
            };
            if token.len() == MAX_AUTHSERV_ID_LEN {
                return Err(NoAuthServId::Oversized);
            }
            token.push(c);
        }
    }

    fn token(&mut self) -> Result<Vec<u8>, NoAuthServId> {
        let start = self.pos;
        self.skip_while(|c| !matches!(c, b' ' | b'\t' | b';' | b'\r' | b'\n'));
        let token = &self.input[start..self.pos];
        if token.len() > MAX_AUTHSERV_ID_LEN {
            return Err(NoAuthServId::Oversized);
        }
        Ok(token.to_vec())
    }
}

fn is_wsp(c: u8) -> bool {
    c == b' ' || c == b'\t'
}

fn is_fws(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(value: &str) -> Result<String, NoAuthServId> {
        extract_authserv_id(value.as_bytes())
    }

    #[test]
    fn test_bare_token() {
        assert_eq!(extract("Authentication-Results: example.org; spf=pass").unwrap(), "example.org");
        assert_eq!(extract("Authentication-Results: example.org").unwrap(), "example.org");
        assert_eq!(extract("Authentication-Results:example.org 1; none").unwrap(), "example.org");
    }

    #[test]
    fn test_whitespace_before_colon_and_case() {
        assert_eq!(extract("authentication-results \t: mx.example").unwrap(), "mx.example");
    }

    #[test]
    fn test_folded_equals_unfolded() {
        let unfolded = extract("Authentication-Results: (c) example.org; spf=pass").unwrap();
        let folded = extract("Authentication-Results:\r\n \t(c)\r\n\t \r\n example.org;\r\n spf=pass").unwrap();
        assert_eq!(folded, unfolded);
    }

    #[test]
    fn test_token_ends_at_fold() {
        assert_eq!(extract("Authentication-Results: example.org\r\n spf=pass").unwrap(), "example.org");
    }

    #[test]
    fn test_comment_skipped() {
        assert_eq!(
            extract("Authentication-Results: mail.example (comment) example.org;").unwrap(),
            "mail.example"
        );
        assert_eq!(
            extract("Authentication-Results: (comment) example.org;").unwrap(),
            "example.org"
        );
    }

    #[test]
    fn test_nested_comments_and_quoted_pairs() {
        let value = r#"Authentication-Results: (outer (inner \) still inner) "quoted ) text" \(x) example.org;"#;
        assert_eq!(extract(value).unwrap(), "example.org");
    }

    #[test]
    fn test_multiple_comments_with_folding() {
        let value = "Authentication-Results: (one)\r\n (two\r\n continued) (three) example.org";
        assert_eq!(extract(value).unwrap(), "example.org");
    }

    #[test]
    fn test_quoted_string_unescaped() {
        assert_eq!(extract(r#"Authentication-Results: "example.org"; none"#).unwrap(), "example.org");
        assert_eq!(extract(r#"Authentication-Results: "ex\"am\)ple""#).unwrap(), r#"ex"am)ple"#);
        assert_eq!(extract(r#"Authentication-Results: "mail.G\luet.ch""#).unwrap(), "mail.Gluet.ch");
        assert_eq!(extract(r#"Authentication-Results: "a b;c""#).unwrap(), "a b;c");
    }

    #[test]
    fn test_quoted_string_line_break_rejected() {
        assert_eq!(
            extract("Authentication-Results: \"example\r\n .org\""),
            Err(NoAuthServId::Unterminated)
        );
        assert_eq!(extract("Authentication-Results: \"example.org"), Err(NoAuthServId::Unterminated));
        assert_eq!(extract("Authentication-Results: \"example.org\\"), Err(NoAuthServId::Unterminated));
    }

    #[test]
    fn test_oversized_token() {
        let max = "a".repeat(MAX_AUTHSERV_ID_LEN);
        assert_eq!(extract(&format!("Authentication-Results: {max};")).unwrap(), max);

        let long = "a".repeat(MAX_AUTHSERV_ID_LEN + 1);
        assert_eq!(extract(&format!("Authentication-Results: {long};")), Err(NoAuthServId::Oversized));
        assert_eq!(
            extract(&format!("Authentication-Results: \"{long}\";")),
            Err(NoAuthServId::Oversized)
        );
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(
            extract("Authentication-Results: (never closed example.org"),
            Err(NoAuthServId::Malformed(_))
        ));
        assert!(matches!(
            extract("Authentication-Results: (a \\"),
            Err(NoAuthServId::Malformed(_))
        ));
        assert!(matches!(
            extract("Authentication-Results: (\"open) example.org"),
            Err(NoAuthServId::Malformed(_))
        ));
        assert!(matches!(extract("Authentication-Results:  \r\n "), Err(NoAuthServId::Malformed(_))));
        assert!(matches!(extract("Authentication-Results example.org"), Err(NoAuthServId::Malformed(_))));
        assert!(matches!(extract("Received: example.org"), Err(NoAuthServId::Malformed(_))));
    }

    #[test]
    fn test_empty_token() {
        assert_eq!(extract("Authentication-Results: ; spf=pass"), Err(NoAuthServId::Empty));
        assert_eq!(extract("Authentication-Results: \"\";"), Err(NoAuthServId::Empty));
    }

    #[test]
    fn test_eight_bit_comment_skipped() {
        let value = b"Authentication-Results: (Gr\xfc\xdfe aus \xc4gypten) example.org; spf=pass";
        assert_eq!(extract_authserv_id(value).unwrap(), "example.org");
    }

    #[test]
    fn test_eight_bit_token_not_usable() {
        assert!(matches!(
            extract_authserv_id(b"Authentication-Results: exampl\xe9.org;"),
            Err(NoAuthServId::Malformed(_))
        ));
    }

    #[test]
    fn test_extraction_is_repeatable() {
        let value = "Authentication-Results: (x) \"a\\\"b\";\r\n spf=pass";
        assert_eq!(extract(value), extract(value));
    }
}
