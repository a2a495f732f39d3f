//! UDP and TCP listeners for the [`Resolver`].

use std::{io, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream, UdpSocket},
    sync::watch,
};

use super::{DnsError, Resolver, Transport, MAX_UDP_PAYLOAD};

/// TCP connections idle longer than this are closed.
pub const TCP_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after a socket error that is likely to repeat immediately.
const ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Serve queries on `socket` until `shutdown` flips to true.
pub async fn serve_udp(
    socket: UdpSocket,
    resolver: Resolver,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), DnsError> {
    let socket = Arc::new(socket);
    tracing::info!("DNS server listening on udp://{}", socket.local_addr()?);

    let mut buf = vec![0u8; usize::from(MAX_UDP_PAYLOAD)];
    loop {
        let (len, peer) = tokio::select! {
            received = socket.recv_from(&mut buf) => match received {
                Ok(received) => received,
                Err(e) => {
                    tracing::debug!("UDP receive error: {}", e);
                    if !is_per_packet_error(&e) {
                        tokio::time::sleep(ERROR_BACKOFF).await;
                    }
                    continue;
                }
            },
            _ = shutdown.changed() => break,
        };

        let packet = buf[..len].to_vec();
        let socket = Arc::clone(&socket);
        let resolver = resolver.clone();
        tokio::spawn(async move {
            if let Some(reply) = resolver.handle_bytes(&packet, Transport::Udp) {
                if let Err(e) = socket.send_to(&reply, peer).await {
                    tracing::warn!("Failed to send DNS reply to {}: {}", peer, e);
                }
            }
        });
    }

    tracing::info!("UDP DNS server stopped");
    Ok(())
}

/// Serve length-prefixed queries on `listener` until `shutdown` flips to true.
pub async fn serve_tcp(
    listener: TcpListener,
    resolver: Resolver,
    shutdown: watch::Receiver<bool>,
) -> Result<(), DnsError> {
    serve_tcp_with_idle_timeout(listener, resolver, TCP_IDLE_TIMEOUT, shutdown).await
}

/// [`serve_tcp`] with a custom idle timeout per connection.
pub async fn serve_tcp_with_idle_timeout(
    listener: TcpListener,
    resolver: Resolver,
    idle_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), DnsError> {
    tracing::info!("DNS server listening on tcp://{}", listener.local_addr()?);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("TCP accept error: {}", e);
                    if !is_per_packet_error(&e) {
                        tokio::time::sleep(ERROR_BACKOFF).await;
                    }
                    continue;
                }
            },
            _ = shutdown.changed() => break,
        };

        let resolver = resolver.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_tcp_connection(stream, &resolver, idle_timeout).await {
                tracing::debug!("TCP DNS connection from {} ended: {}", peer, e);
            }
        });
    }

    tracing::info!("TCP DNS server stopped");
    Ok(())
}

/// Errors tied to one peer rather than the socket, such as an ICMP
/// port-unreachable from an earlier reply surfacing on the next receive.
fn is_per_packet_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::Interrupted
    )
}

async fn handle_tcp_connection(
    mut stream: TcpStream,
    resolver: &Resolver,
    idle_timeout: Duration,
) -> Result<(), DnsError> {
    loop {
        let len = match tokio::time::timeout(idle_timeout, stream.read_u16()).await {
            Ok(Ok(len)) => usize::from(len),
            Ok(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Ok(()),
        };

        let mut packet = vec![0u8; len];
        tokio::time::timeout(idle_timeout, stream.read_exact(&mut packet))
            .await
            .map_err(|_| io::Error::from(io::ErrorKind::TimedOut))??;

        let Some(reply) = resolver.handle_bytes(&packet, Transport::Tcp) else {
            return Ok(());
        };
        let reply_len = u16::try_from(reply.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "reply too large"))?;

        stream.write_u16(reply_len).await?;
        stream.write_all(&reply).await?;
    }
}
