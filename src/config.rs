use regex::bytes::Regex;
use serde::{Deserialize, Serialize};

/// Longest authserv-id we accept, configured or extracted. Mirrors the
/// host name limit so the default (the host name) always fits.
pub const MAX_AUTHSERV_ID_LEN: usize = 255;

pub const DEFAULT_SPAM_MARKER_PREFIX: &str = "X-Spam";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Falls back to the host name when unset.
    pub authserv_id: Option<String>,
    pub reject: bool,
    pub strip_spam_markers: bool,
    pub spam_marker_prefix: String,
    pub verbose: u8,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            authserv_id: None,
            reject: false,
            strip_spam_markers: false,
            spam_marker_prefix: DEFAULT_SPAM_MARKER_PREFIX.to_string(),
            verbose: 0,
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate and freeze into the policy shared by every message.
    pub fn into_policy(self) -> anyhow::Result<Policy> {
        let authserv_id = match self.authserv_id {
            Some(id) => id,
            None => hostname()?,
        };
        validate_authserv_id(&authserv_id)?;

        let spam_marker = if self.strip_spam_markers {
            Some(spam_marker_regex(&self.spam_marker_prefix)?)
        } else {
            None
        };

        Ok(Policy {
            authserv_id,
            reject: self.reject,
            spam_marker,
            verbose: self.verbose,
        })
    }
}

/// Immutable process-wide settings. Built once at startup.
#[derive(Debug, Clone)]
pub struct Policy {
    pub authserv_id: String,
    pub reject: bool,
    pub spam_marker: Option<Regex>,
    pub verbose: u8,
}

impl Policy {
    pub fn new(authserv_id: &str) -> anyhow::Result<Self> {
        Config {
            authserv_id: Some(authserv_id.to_string()),
            ..Default::default()
        }
        .into_policy()
    }

    /// Length of the spam-marker field name (up to and including the
    /// colon) if `line` starts such a header.
    pub fn spam_marker_len(&self, line: &[u8]) -> Option<usize> {
        self.spam_marker
            .as_ref()
            .and_then(|re| re.find(line))
            .map(|m| m.end())
    }
}

pub fn validate_authserv_id(id: &str) -> anyhow::Result<()> {
    if id.is_empty() {
        anyhow::bail!("authserv-id is empty");
    }
    if id.len() > MAX_AUTHSERV_ID_LEN {
        anyhow::bail!("authserv-id is too long");
    }
    if id.contains(['\r', '\n']) {
        anyhow::bail!("unsupported character in authserv-id");
    }
    Ok(())
}

fn spam_marker_regex(prefix: &str) -> anyhow::Result<Regex> {
    if prefix.is_empty() || !prefix.bytes().all(is_ftext) {
        anyhow::bail!("invalid spam marker prefix: {prefix:?}");
    }
    // ftext minus ':' is everything printable from '!' to '~'
    let pattern = format!(r"(?i)^{}[!-9;-~]*[ \t]*:", regex::escape(prefix));
    Ok(Regex::new(&pattern)?)
}

fn is_ftext(b: u8) -> bool {
    (33..=126).contains(&b) && b != b':'
}

fn hostname() -> anyhow::Result<String> {
    let mut buf = [0u8; MAX_AUTHSERV_ID_LEN + 1];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc == -1 {
        return Err(anyhow::Error::new(std::io::Error::last_os_error()).context("gethostname"));
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}
