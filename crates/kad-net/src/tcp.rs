//! The concrete TCP [`Transport`]: a fresh connection per outbound call,
//! and a plain accept loop for inbound connections.
//!
//! Per the dispatcher's contract, a connection carries exactly one
//! request and one reply; there is no connection pooling or reuse, and a
//! call that times out simply drops its socket rather than attempting to
//! recover it.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};

use kad_table::Peer;

use crate::framing::{read_frame, write_frame};
use crate::{DispatchError, Transport};

/// A TCP-backed [`Transport`]. Binds one listening socket for inbound
/// traffic; outbound `call`s open an independent connection per attempt.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Bind a listening socket at `addr`.
    pub async fn bind(addr: SocketAddr) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    /// The address this transport ended up bound to (useful when `addr`
    /// was given as port 0 for an ephemeral port, e.g. in tests).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for TcpTransport {
    type Conn = TcpStream;

    async fn serve_one(
        &self,
        timeout: Duration,
    ) -> Result<Option<(Vec<u8>, Self::Conn)>, DispatchError> {
        let accepted = match tokio::time::timeout(timeout, self.listener.accept()).await {
            Ok(result) => result.map_err(|e| DispatchError::Io(e.to_string()))?,
            Err(_elapsed) => return Ok(None),
        };
        let (mut stream, _peer_addr) = accepted;
        let bytes = read_frame(&mut stream)
            .await
            .map_err(|e| DispatchError::Io(e.to_string()))?;
        Ok(Some((bytes, stream)))
    }

    async fn reply(&self, mut conn: Self::Conn, bytes: &[u8]) -> Result<(), DispatchError> {
        write_frame(&mut conn, bytes)
            .await
            .map_err(|e| DispatchError::Io(e.to_string()))
    }

    async fn call(
        &self,
        peer: &Peer,
        bytes: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, DispatchError> {
        let attempt = async {
            let mut stream = TcpStream::connect((peer.host.as_str(), peer.port))
                .await
                .map_err(|e| DispatchError::Io(e.to_string()))?;
            write_frame(&mut stream, bytes)
                .await
                .map_err(|e| DispatchError::Io(e.to_string()))?;
            read_frame(&mut stream)
                .await
                .map_err(|e| DispatchError::Io(e.to_string()))
        };

        match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result,
            Err(_elapsed) => Err(DispatchError::Timeout),
        }
    }
}
