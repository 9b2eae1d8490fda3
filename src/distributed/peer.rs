//! Outbound requests to peer nodes
//!
//! One TCP connection per request. Every failure on the way (connect,
//! write, read, decode, timeout) becomes `TransportFailure` naming the peer.

use super::protocol::{read_message, write_message, Message};
use crate::error::DispatchError;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

#[derive(Debug, Clone)]
pub struct PeerClient {
    connect_timeout: Duration,
    call_timeout: Duration,
}

impl PeerClient {
    pub fn new(connect_timeout: Duration, call_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            call_timeout,
        }
    }

    /// Send `request` to `addr` and wait for its reply
    pub async fn call(&self, addr: &str, request: &Message) -> Result<Message, DispatchError> {
        let failure = |reason: String| DispatchError::TransportFailure {
            peer: addr.to_string(),
            reason,
        };

        let mut stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| failure(format!("connect timed out after {:?}", self.connect_timeout)))?
            .map_err(|e| failure(format!("connect failed: {}", e)))?;
        // Small frames, send immediately
        stream.set_nodelay(true).ok();

        log::debug!("-> {} {}", addr, request.name());
        let exchange = async {
            write_message(&mut stream, request).await?;
            read_message(&mut stream).await
        };

        let reply = timeout(self.call_timeout, exchange)
            .await
            .map_err(|_| failure(format!("no reply within {:?}", self.call_timeout)))?
            .map_err(|e| failure(format!("{:#}", e)))?;
        log::debug!("<- {} {}", addr, reply.name());

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::protocol::{ErrorMessage, ReportRequest};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_call_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_message(&mut socket).await.unwrap();
            assert!(matches!(request, Message::GetReport(_)));
            write_message(&mut socket, &Message::Error(ErrorMessage::new("nope")))
                .await
                .unwrap();
        });

        let client = PeerClient::new(Duration::from_secs(1), Duration::from_secs(1));
        let reply = client
            .call(&addr, &Message::GetReport(ReportRequest::default()))
            .await
            .unwrap();
        assert_eq!(reply, Message::Error(ErrorMessage::new("nope")));
    }

    #[tokio::test]
    async fn test_unreachable_peer_is_transport_failure() {
        // bind then drop to get a port nobody listens on
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };

        let client = PeerClient::new(Duration::from_secs(1), Duration::from_secs(1));
        let err = client
            .call(&addr, &Message::GetReport(ReportRequest::default()))
            .await
            .unwrap_err();
        match err {
            DispatchError::TransportFailure { peer, .. } => assert_eq!(peer, addr),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(socket);
        });

        let client = PeerClient::new(Duration::from_secs(1), Duration::from_millis(50));
        let err = client
            .call(&addr, &Message::GetReport(ReportRequest::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::TransportFailure { .. }));
    }
}
