//! The byte streams a session reads lines from and writes frames to.

use std::fmt;

use tokio::io::{self, AsyncRead, AsyncWrite, DuplexStream, ReadHalf, WriteHalf};

use crate::protocol::FrameReader;

const IN_PROCESS_BUFFER: usize = 64 * 1024;

/// Input and output streams handed to [`SessionRegistry::use_session`].
///
/// [`SessionRegistry::use_session`]: super::SessionRegistry::use_session
pub struct SessionStreams {
    pub(crate) input: Box<dyn AsyncRead + Unpin + Send>,
    pub(crate) output: Box<dyn AsyncWrite + Unpin + Send>,
    pub(crate) address: Option<String>,
    pub(crate) submitter: Option<SubmitEnds>,
}

impl SessionStreams {
    /// Streams owned by a transport, such as the halves of a socket.
    pub fn new<R, W>(input: R, output: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self {
            input: Box::new(input),
            output: Box::new(output),
            address: None,
            submitter: None,
        }
    }

    /// An in-memory pipe pair whose other ends the registry keeps, so that
    /// commands can be submitted with `send_command`.
    pub fn in_process() -> Self {
        let (session_end, client_end) = io::duplex(IN_PROCESS_BUFFER);
        let (input, output) = io::split(session_end);
        let (reader, writer) = io::split(client_end);
        Self {
            input: Box::new(input),
            output: Box::new(output),
            address: None,
            submitter: Some(SubmitEnds {
                writer,
                reader: FrameReader::new(reader),
            }),
        }
    }

    /// Address reported by `hello` and used to derive an id when none is
    /// given.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn is_in_process(&self) -> bool {
        self.submitter.is_some()
    }
}

impl fmt::Debug for SessionStreams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStreams")
            .field("address", &self.address)
            .field("in_process", &self.is_in_process())
            .finish()
    }
}

/// The submitting side of an in-process session.
pub(crate) struct SubmitEnds {
    pub(crate) writer: WriteHalf<DuplexStream>,
    pub(crate) reader: FrameReader<ReadHalf<DuplexStream>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn test_in_process_pipes_connect() {
        let streams = SessionStreams::in_process().with_address("local");
        assert!(streams.is_in_process());
        assert_eq!(streams.address(), Some("local"));

        let SessionStreams {
            input,
            mut output,
            submitter,
            ..
        } = streams;
        let mut ends = submitter.unwrap();

        ends.writer.write_all(b"1+1\n").await.unwrap();
        let mut line = String::new();
        BufReader::new(input).read_line(&mut line).await.unwrap();
        assert_eq!(line, "1+1\n");

        output.write_all(b"2\0").await.unwrap();
        assert_eq!(ends.reader.next_frame().await.unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn test_transport_streams_are_detached() {
        let (a, b) = io::duplex(16);
        let streams = SessionStreams::new(a, b);
        assert!(!streams.is_in_process());
        assert_eq!(streams.address(), None);
    }
}
