//! Interactive client: relays lines from a terminal to a REPL transport.
//!
//! The client sends `hello` first and only enters the prompt loop when the
//! server answers. Each following line is sent as-is and the response is
//! printed unchanged.

mod address;
mod history;
mod transport;

use std::io;

use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

pub use address::{Address, DEFAULT_ADDRESS};
pub use history::History;
pub use transport::{
    ClientTransport, Connector, HttpTransport, InvokeTransport, ProtocolRegistry, TelnetTransport,
};

/// Client errors.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid address: {0}")]
    Address(String),

    #[error("could not connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// How the prompt loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// `quit` or `exit` was typed, or input ended.
    Quit,
    /// The server closed the connection.
    Closed,
}

/// A connected client.
pub struct Client {
    transport: Box<dyn ClientTransport>,
    history: History,
    remote_id: String,
    version: String,
}

impl Client {
    /// Connect and perform the `hello` handshake.
    pub async fn connect(
        registry: &ProtocolRegistry,
        address: &Address,
        history: History,
    ) -> Result<Self, ClientError> {
        let transport = registry.connect(address).await?;
        Self::handshake(transport, history).await
    }

    /// Perform the handshake over an already open transport.
    pub async fn handshake(
        mut transport: Box<dyn ClientTransport>,
        history: History,
    ) -> Result<Self, ClientError> {
        let reply = transport.send("hello").await?;
        let hello: Value = serde_json::from_str(reply.trim())
            .map_err(|e| {
                ClientError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unexpected hello reply {:?}: {}", reply, e),
                ))
            })?;
        let field = |key: &str| hello[key].as_str().unwrap_or_default().to_string();

        Ok(Self {
            transport,
            history,
            remote_id: field("id"),
            version: field("version"),
        })
    }

    pub fn remote_id(&self) -> &str {
        &self.remote_id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn prompt(&self) -> String {
        format!("{}-> ", self.remote_id)
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Send one line and return the response text.
    pub async fn send(&mut self, line: &str) -> Result<String, ClientError> {
        if let Err(e) = self.history.push(line) {
            debug!("History not saved: {}", e);
        }
        self.transport.send(line).await
    }

    /// Prompt, read a line, send it and print the response until the user
    /// quits or the connection closes.
    pub async fn run<R, W>(&mut self, input: R, mut output: W) -> Result<Outcome, ClientError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        loop {
            output.write_all(self.prompt().as_bytes()).await?;
            output.flush().await?;

            let Some(line) = lines.next_line().await? else {
                return Ok(Outcome::Quit);
            };
            if matches!(line.trim(), "quit" | "exit") {
                return Ok(Outcome::Quit);
            }

            match self.send(&line).await {
                Ok(out) => {
                    output.write_all(out.as_bytes()).await?;
                    if !out.is_empty() && !out.ends_with('\n') {
                        output.write_all(b"\n").await?;
                    }
                }
                Err(ClientError::ConnectionClosed) => {
                    output.write_all(b"Connection closed.\n").await?;
                    output.flush().await?;
                    return Ok(Outcome::Closed);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    struct Scripted {
        replies: VecDeque<Result<String, ClientError>>,
    }

    #[async_trait]
    impl ClientTransport for Scripted {
        async fn send(&mut self, _cmd: &str) -> Result<String, ClientError> {
            self.replies
                .pop_front()
                .unwrap_or(Err(ClientError::ConnectionClosed))
        }
    }

    fn scripted(replies: Vec<Result<String, ClientError>>) -> Box<dyn ClientTransport> {
        Box::new(Scripted {
            replies: replies.into(),
        })
    }

    fn hello() -> Result<String, ClientError> {
        Ok(r#"{"version":"0.1.0","id":"abc/1","when":1,"address":"x"}"#.to_string())
    }

    #[tokio::test]
    async fn test_handshake_sets_prompt() {
        let client = Client::handshake(scripted(vec![hello()]), History::in_memory())
            .await
            .unwrap();
        assert_eq!(client.remote_id(), "abc/1");
        assert_eq!(client.version(), "0.1.0");
        assert_eq!(client.prompt(), "abc/1-> ");
    }

    #[tokio::test]
    async fn test_handshake_failure() {
        let err = Client::handshake(scripted(vec![]), History::in_memory()).await;
        assert!(matches!(err, Err(ClientError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_run_until_quit() {
        let mut client = Client::handshake(
            scripted(vec![hello(), Ok("3".to_string())]),
            History::in_memory(),
        )
        .await
        .unwrap();

        let mut out = Vec::new();
        let outcome = client.run(&b"1+2\nquit\n1+1\n"[..], &mut out).await.unwrap();
        assert_eq!(outcome, Outcome::Quit);
        assert_eq!(String::from_utf8(out).unwrap(), "abc/1-> 3\nabc/1-> ");
        assert_eq!(client.history().entries(), ["1+2"]);
    }

    #[tokio::test]
    async fn test_run_connection_closed() {
        let mut client = Client::handshake(scripted(vec![hello()]), History::in_memory())
            .await
            .unwrap();

        let mut out = Vec::new();
        let outcome = client.run(&b"1+2\n"[..], &mut out).await.unwrap();
        assert_eq!(outcome, Outcome::Closed);
        assert!(String::from_utf8(out).unwrap().ends_with("Connection closed.\n"));
    }
}
