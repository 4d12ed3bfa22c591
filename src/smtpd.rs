use crate::config::Policy;
use crate::filter::FilterEngine;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

pub struct SmtpdFilter {
    engine: FilterEngine,
}

impl SmtpdFilter {
    pub fn new(policy: Policy) -> Self {
        SmtpdFilter {
            engine: FilterEngine::new(Arc::new(policy)),
        }
    }

    /// Serve the filter protocol until `reader` reaches EOF.
    pub async fn run<R, W>(&mut self, mut reader: R, mut writer: W) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        log::info!(
            "Scrubbing Authentication-Results for authserv-id '{}' ({})",
            self.engine.policy().authserv_id,
            if self.engine.policy().reject { "reject" } else { "filter" }
        );

        // message bodies are not guaranteed to be UTF-8, so read raw lines
        let mut line = Vec::new();
        let mut out = Vec::new();

        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line).await? == 0 {
                break;
            }
            if line.last() == Some(&b'\n') {
                line.pop();
            }
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            self.engine.handle(&line, &mut out)?;
            if out.is_empty() {
                continue;
            }
            for response in out.drain(..) {
                writer.write_all(&response).await?;
                writer.write_all(b"\n").await?;
            }
            writer.flush().await?;
        }

        log::debug!("smtpd closed the filter pipe");
        Ok(())
    }

    pub async fn run_stdio(&mut self) -> anyhow::Result<()> {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();

        tokio::select! {
            res = self.run(stdin, stdout) => res,
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, shutting down");
                Ok(())
            }
        }
    }
}
