use crate::domain::ListenAddress;
use std::io;
use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

/// A bound live-channel socket.
#[derive(Debug)]
pub enum ChannelListener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

/// The single connected peer of a live channel.
#[derive(Debug)]
pub enum PeerStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl ChannelListener {
    /// Binds `address`. A stale Unix socket file left by a previous run is
    /// removed first, and missing parent directories are created.
    pub async fn bind(address: &ListenAddress) -> io::Result<Self> {
        match address {
            ListenAddress::Tcp(addr) => Ok(ChannelListener::Tcp(TcpListener::bind(addr).await?)),
            #[cfg(unix)]
            ListenAddress::Unix(path) => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                match tokio::fs::remove_file(path).await {
                    Ok(()) => tracing::debug!("Removed stale socket {}", path.display()),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e),
                }
                Ok(ChannelListener::Unix(UnixListener::bind(path)?))
            }
            #[cfg(not(unix))]
            ListenAddress::Unix(path) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("Unix sockets are unavailable here: {}", path.display()),
            )),
        }
    }

    pub async fn accept(&self) -> io::Result<(PeerStream, String)> {
        match self {
            ChannelListener::Tcp(listener) => {
                let (stream, addr) = listener.accept().await?;
                Ok((PeerStream::Tcp(stream), addr.to_string()))
            }
            #[cfg(unix)]
            ChannelListener::Unix(listener) => {
                let (stream, _) = listener.accept().await?;
                Ok((PeerStream::Unix(stream), "unix peer".to_string()))
            }
        }
    }

    /// Actual bound address, useful when binding to port 0.
    pub fn local_address(&self) -> io::Result<ListenAddress> {
        match self {
            ChannelListener::Tcp(listener) => listener.local_addr().map(ListenAddress::Tcp),
            #[cfg(unix)]
            ChannelListener::Unix(listener) => {
                let addr = listener.local_addr()?;
                addr.as_pathname()
                    .map(|p| ListenAddress::Unix(p.to_path_buf()))
                    .ok_or_else(|| io::Error::other("unnamed unix socket"))
            }
        }
    }
}
