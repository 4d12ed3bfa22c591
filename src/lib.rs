pub mod cache;
pub mod config;
pub mod decision;
pub mod filter;
pub mod header;
pub mod message;
pub mod protocol;
pub mod smtpd;

pub use config::{Config, Policy};
pub use decision::Verdict;
pub use filter::FilterEngine;
pub use message::MessageScan;
pub use smtpd::SmtpdFilter;
