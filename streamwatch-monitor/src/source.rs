//! Line sources: the readable half of a live connection.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// A stream of text lines from one connection.
#[async_trait]
pub trait LineSource: Send {
    /// Read the next line without its line terminator.
    ///
    /// Returns `Ok(None)` at end of stream. Invalid UTF-8 is replaced rather
    /// than reported, so a garbled line never tears down the connection.
    async fn next_line(&mut self) -> io::Result<Option<String>>;
}

/// A line source over any buffered tokio reader.
///
/// Useful for replaying a captured feed from a file or stdin, and in tests.
///
/// # Example
///
/// ```
/// use std::io::Cursor;
/// use streamwatch_monitor::{LineSource, ReaderLineSource};
///
/// # tokio_test::block_on(async {
/// let mut source = ReaderLineSource::new(Cursor::new(b"data: {}\r\n\nping\n".to_vec()));
/// assert_eq!(source.next_line().await.unwrap().as_deref(), Some("data: {}"));
/// assert_eq!(source.next_line().await.unwrap().as_deref(), Some(""));
/// assert_eq!(source.next_line().await.unwrap().as_deref(), Some("ping"));
/// assert_eq!(source.next_line().await.unwrap(), None);
/// # });
/// ```
#[derive(Debug)]
pub struct ReaderLineSource<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R> ReaderLineSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }
}

#[async_trait]
impl<R> LineSource for ReaderLineSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf).await? == 0 {
            return Ok(None);
        }
        Ok(Some(decode_line(&self.buf)))
    }
}

/// Strip a trailing `\n` or `\r\n` and decode lossily.
pub(crate) fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
