use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use catchment_common::{config::ServerTimeouts, error::SessionError, outgoing};
use tokio::{
    io::{
        AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt,
        BufReader, ReadBuf,
    },
    time::{Instant, Sleep, timeout},
};

/// Longest command line accepted, terminator included.
pub const MAX_LINE_LENGTH: usize = 4096;

/// A client connection with buffered reads and bounded waits in both
/// directions.
pub struct Connection<Stream> {
    stream: BufReader<Stream>,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send> Connection<Stream> {
    pub fn new(stream: Stream, timeouts: &ServerTimeouts) -> Self {
        Self {
            stream: BufReader::new(stream),
            read_timeout: timeouts.read(),
            write_timeout: timeouts.write(),
        }
    }

    /// Write one reply, CRLF terminated.
    ///
    /// # Errors
    ///
    /// If the write fails or does not finish within the write timeout.
    pub async fn send<S: core::fmt::Display + Send + Sync>(
        &mut self,
        response: &S,
    ) -> Result<(), SessionError> {
        let response = format!("{response}\r\n");
        outgoing!("{}", response.trim_end());

        let stream = &mut self.stream;
        let write = async move {
            stream.write_all(response.as_bytes()).await?;
            stream.flush().await
        };

        match timeout(self.write_timeout, write).await {
            Ok(result) => result.map_err(SessionError::from),
            Err(_) => Err(SessionError::Timeout(self.write_timeout.as_secs())),
        }
    }

    /// Read one command line without its terminator.
    ///
    /// Returns `None` once the client has closed the connection.
    ///
    /// # Errors
    ///
    /// If nothing arrives within the read timeout, the line is longer than
    /// [`MAX_LINE_LENGTH`], or the read fails.
    pub async fn read_line(&mut self) -> Result<Option<String>, SessionError> {
        let mut line = Vec::new();
        let limit = u64::try_from(MAX_LINE_LENGTH).unwrap_or(u64::MAX);
        let mut limited = (&mut self.stream).take(limit);

        let read = match timeout(self.read_timeout, limited.read_until(b'\n', &mut line)).await {
            Ok(read) => read?,
            Err(_) => return Err(SessionError::Timeout(self.read_timeout.as_secs())),
        };

        if read == 0 {
            return Ok(None);
        }

        if !line.ends_with(b"\n") {
            if line.len() >= MAX_LINE_LENGTH {
                return Err(SessionError::Protocol(format!(
                    "Command line exceeds {MAX_LINE_LENGTH} bytes"
                )));
            }

            // Connection closed part way through a line
            return Ok(None);
        }

        let line = String::from_utf8_lossy(&line);
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    /// A reader over the message body that follows a `354`.
    ///
    /// `max_size` of 0 means no limit.
    pub fn data_reader(&mut self, max_size: usize) -> DataReader<'_, Stream> {
        DataReader::new(&mut self.stream, max_size, self.read_timeout)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dot {
    /// At the start of a line
    BeginLine,
    /// Read a `.` at the start of a line
    Dot,
    /// Read `.\r` at the start of a line
    DotCr,
    /// Read a `\r` mid line
    Cr,
    Data,
    /// Read the terminating `.\r\n`
    Eof,
}

/// Undo dot-stuffing from `input` into `output` until either runs out or the
/// terminator is found.
///
/// Returns how many input bytes were consumed.
fn unstuff(state: &mut Dot, input: &[u8], output: &mut ReadBuf<'_>) -> usize {
    let mut consumed = 0;

    while consumed < input.len() && output.remaining() > 0 {
        let byte = input[consumed];

        match *state {
            Dot::BeginLine if byte == b'.' => {
                *state = Dot::Dot;
                consumed += 1;
            }
            Dot::Dot if byte == b'\r' => {
                *state = Dot::DotCr;
                consumed += 1;
            }
            Dot::Dot | Dot::DotCr if byte == b'\n' => {
                *state = Dot::Eof;
                consumed += 1;
            }
            Dot::DotCr => {
                // ".\r" then something other than "\n", the dot was stuffing
                output.put_slice(b"\r");
                *state = Dot::Data;
            }
            Dot::BeginLine | Dot::Dot | Dot::Cr => {
                if *state == Dot::Cr && byte == b'\n' {
                    output.put_slice(b"\n");
                    *state = Dot::BeginLine;
                    consumed += 1;
                } else {
                    *state = Dot::Data;
                }
            }
            Dot::Data => {
                output.put_slice(&[byte]);
                consumed += 1;
                *state = match byte {
                    b'\r' => Dot::Cr,
                    b'\n' => Dot::BeginLine,
                    _ => Dot::Data,
                };
            }
            Dot::Eof => break,
        }
    }

    consumed
}

/// The message body after `DATA`, with dot-stuffing removed and line endings
/// kept. Reaches end of file at the `<CRLF>.<CRLF>` terminator.
///
/// Reading past `max_size` bytes fails. [`DataReader::drain`] then skips the
/// rest of the body so the connection stays usable.
pub struct DataReader<'a, Stream> {
    stream: &'a mut BufReader<Stream>,
    state: Dot,
    limit: usize,
    size: usize,
    exceeded: bool,
    read_timeout: Duration,
    deadline: Pin<Box<Sleep>>,
}

impl<'a, Stream: AsyncRead + Unpin> DataReader<'a, Stream> {
    fn new(stream: &'a mut BufReader<Stream>, limit: usize, read_timeout: Duration) -> Self {
        Self {
            stream,
            state: Dot::BeginLine,
            limit,
            size: 0,
            exceeded: false,
            read_timeout,
            deadline: Box::pin(tokio::time::sleep(read_timeout)),
        }
    }

    /// Whether the body grew past the size limit.
    #[must_use]
    pub const fn exceeded(&self) -> bool {
        self.exceeded
    }

    /// Whether the terminator has been read.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state == Dot::Eof
    }

    /// Read and discard the rest of the body.
    ///
    /// # Errors
    ///
    /// If the connection fails or stalls before the terminator.
    pub async fn drain(&mut self) -> io::Result<()> {
        self.limit = 0;
        let mut scratch = [0u8; 4096];

        while !self.is_finished() {
            self.read(&mut scratch).await?;
        }

        Ok(())
    }
}

impl<Stream: AsyncRead + Unpin> AsyncRead for DataReader<'_, Stream> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        loop {
            if this.state == Dot::Eof || buf.remaining() == 0 {
                return Poll::Ready(Ok(()));
            }

            let available = match Pin::new(&mut *this.stream).poll_fill_buf(cx) {
                Poll::Ready(Ok(available)) => available,
                Poll::Ready(Err(err)) => return Poll::Ready(Err(err)),
                Poll::Pending => {
                    if this.deadline.as_mut().poll(cx).is_ready() {
                        return Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            "Timed out waiting for message data",
                        )));
                    }
                    return Poll::Pending;
                }
            };

            if available.is_empty() {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "Connection closed before end of data",
                )));
            }

            let before = buf.filled().len();
            let consumed = unstuff(&mut this.state, available, buf);
            let produced = buf.filled().len() - before;

            Pin::new(&mut *this.stream).consume(consumed);
            this.deadline
                .as_mut()
                .reset(Instant::now() + this.read_timeout);

            this.size += produced;
            if this.limit > 0 && this.size > this.limit {
                this.exceeded = true;
                return Poll::Ready(Err(io::Error::other(format!(
                    "Message exceeds maximum size of {} bytes",
                    this.limit
                ))));
            }

            if produced > 0 {
                return Poll::Ready(Ok(()));
            }
        }
    }
}
