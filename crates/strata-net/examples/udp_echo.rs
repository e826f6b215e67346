//! Smoke example for the transport boundary `strata-net` sits on top of:
//! bind a socket, echo datagrams back, prove the plumbing works. Not a
//! protocol implementation.
//!
//! Run with: `cargo run -p strata-net --example udp_echo`

use std::net::SocketAddr;

use tokio::net::UdpSocket;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let socket = UdpSocket::bind("127.0.0.1:0").await?;
    let addr = socket.local_addr()?;
    tracing::info!(%addr, "udp echo listening");

    let client = UdpSocket::bind("127.0.0.1:0").await?;
    client.connect(addr).await?;
    client.send(b"ping").await?;

    let mut buf = [0u8; 1024];
    let (len, peer): (usize, SocketAddr) = socket.recv_from(&mut buf).await?;
    tracing::info!(%peer, bytes = len, "received datagram, echoing back");
    socket.send_to(&buf[..len], peer).await?;

    let reply_len = client.recv(&mut buf).await?;
    tracing::info!(bytes = reply_len, "client received echo");
    assert_eq!(&buf[..reply_len], b"ping");

    Ok(())
}
