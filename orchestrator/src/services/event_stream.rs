//! Subprocess event stream consumption
//!
//! Reads a child's stdout in raw chunks and hands them to the
//! [`EventStreamReducer`]. Lines may be split across reads at any byte.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::core::{EventStreamReducer, TestRunSummary};
use crate::error::OrchestratorResult;

const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone)]
pub struct SubprocessEventStreamParser {
    echo: bool,
}

impl Default for SubprocessEventStreamParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SubprocessEventStreamParser {
    pub fn new() -> Self {
        Self { echo: true }
    }

    /// Echo test output through the log while consuming; on by default
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Read until end of stream, returning the reducer for the exit code
    pub async fn consume<R>(&self, mut reader: R) -> OrchestratorResult<EventStreamReducer>
    where
        R: AsyncRead + Unpin,
    {
        let mut reducer = EventStreamReducer::new().with_echo(self.echo);
        let mut chunk = vec![0u8; READ_CHUNK];

        loop {
            let read = reader.read(&mut chunk).await?;
            if read == 0 {
                break;
            }
            reducer.feed(&chunk[..read]);
        }

        Ok(reducer)
    }

    /// Consume a stream whose producer's exit code is already known
    pub async fn consume_to_summary<R>(&self, reader: R, exit_code: Option<i32>) -> OrchestratorResult<TestRunSummary>
    where
        R: AsyncRead + Unpin,
    {
        Ok(self.consume(reader).await?.finish(exit_code))
    }
}
