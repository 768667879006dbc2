use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::oneshot;

/// Upstream stand-in answering every query with `93.184.216.34`, TTL 60,
/// over both UDP and TCP on one port.
pub struct MockDnsServer {
    addr: SocketAddr,
    received: Arc<AtomicUsize>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockDnsServer {
    pub async fn start() -> Result<Self, std::io::Error> {
        let socket = UdpSocket::bind("127.0.0.1:0").await?;
        let addr = socket.local_addr()?;
        let listener = TcpListener::bind(addr).await?;

        let received = Arc::new(AtomicUsize::new(0));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let counter = Arc::clone(&received);
        tokio::spawn(async move {
            let mut buf = vec![0u8; 512];

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        break;
                    }
                    result = socket.recv_from(&mut buf) => {
                        if let Ok((len, peer)) = result {
                            counter.fetch_add(1, Ordering::SeqCst);
                            let response = Self::build_mock_response(&buf[..len]);
                            let _ = socket.send_to(&response, peer).await;
                        }
                    }
                    result = listener.accept() => {
                        if let Ok((stream, _)) = result {
                            let counter = Arc::clone(&counter);
                            tokio::spawn(Self::serve_tcp(stream, counter));
                        }
                    }
                }
            }
        });

        Ok(Self {
            addr,
            received,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    async fn serve_tcp(mut stream: tokio::net::TcpStream, counter: Arc<AtomicUsize>) {
        let mut len_buf = [0u8; 2];
        while stream.read_exact(&mut len_buf).await.is_ok() {
            let mut query = vec![0u8; u16::from_be_bytes(len_buf) as usize];
            if stream.read_exact(&mut query).await.is_err() {
                break;
            }
            counter.fetch_add(1, Ordering::SeqCst);

            let response = Self::build_mock_response(&query);
            let mut framed = (response.len() as u16).to_be_bytes().to_vec();
            framed.extend_from_slice(&response);
            if stream.write_all(&framed).await.is_err() {
                break;
            }
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Queries received so far, both transports.
    pub fn received(&self) -> usize {
        self.received.load(Ordering::SeqCst)
    }

    /// Echoes the question and appends one compressed A answer.
    pub fn build_mock_response(query: &[u8]) -> Vec<u8> {
        if query.len() < 12 {
            return vec![];
        }

        let mut response = Vec::with_capacity(512);

        response.extend_from_slice(&query[0..2]);

        response.push(0x81);
        response.push(0x80);

        response.extend_from_slice(&query[4..6]);

        response.extend_from_slice(&[0x00, 0x01]);

        response.extend_from_slice(&[0x00, 0x00]);

        response.extend_from_slice(&[0x00, 0x00]);

        if query.len() > 12 {
            response.extend_from_slice(&query[12..]);
        }

        response.extend_from_slice(&[
            0xc0, 0x0c,
            0x00, 0x01,
            0x00, 0x01,
            0x00, 0x00, 0x00, 0x3c,
            0x00, 0x04,
            93, 184, 216, 34,
        ]);

        response
    }

    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockDnsServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
