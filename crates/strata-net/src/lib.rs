//! Abstract stream boundary: something that can be read from and written
//! to asynchronously, and closed explicitly. Nothing here defines a
//! transport of its own — it is the seam other crates program against so
//! they never have to name a concrete socket type directly.

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Anything readable, writable, and closable the way a network
/// connection is. Blanket-implemented for every type already satisfying
/// `tokio::io::{AsyncRead, AsyncWrite}`, so `TcpStream`, `UnixStream`, and
/// `tokio::io::DuplexStream` all qualify with no extra glue.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {
    /// Half-closes the write side, signalling no more data will follow.
    fn close(&mut self) -> Pin<Box<dyn Future<Output = std::io::Result<()>> + Send + '_>> {
        Box::pin(self.shutdown())
    }
}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}
