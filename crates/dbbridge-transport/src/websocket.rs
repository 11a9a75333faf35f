//! WebSocket client connection using `tokio-tungstenite`.

use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{Connection, ConnectionId, Framing, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A WebSocket connection to a router.
///
/// The stream is split so that one task can sit in `recv` while others
/// send. Each half has its own lock.
pub struct WebSocketConnection {
    id: ConnectionId,
    framing: Framing,
    subprotocol: Option<String>,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl WebSocketConnection {
    /// Connects to `url`, offering `subprotocol` during the handshake.
    pub async fn connect(
        url: &str,
        subprotocol: &str,
    ) -> Result<Self, TransportError> {
        let mut request = url.into_client_request().map_err(|e| {
            TransportError::InvalidEndpoint {
                url: url.to_string(),
                reason: e.to_string(),
            }
        })?;
        let offered = HeaderValue::from_str(subprotocol).map_err(|e| {
            TransportError::InvalidEndpoint {
                url: url.to_string(),
                reason: e.to_string(),
            }
        })?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", offered);

        let (ws, response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| {
                TransportError::ConnectFailed(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    e,
                ))
            })?;

        let negotiated = response
            .headers()
            .get("Sec-WebSocket-Protocol")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let id = ConnectionId::new(
            NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
        );
        tracing::debug!(
            %id,
            url,
            subprotocol = negotiated.as_deref().unwrap_or("none"),
            "WebSocket connection established"
        );

        let framing = Framing::for_subprotocol(
            negotiated.as_deref().unwrap_or(subprotocol),
        );
        let (sink, stream) = ws.split();

        Ok(Self {
            id,
            framing,
            subprotocol: negotiated,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }

    /// The subprotocol the server agreed to, if it named one.
    pub fn subprotocol(&self) -> Option<&str> {
        self.subprotocol.as_deref()
    }

    fn frame(&self, data: &[u8]) -> Result<Message, TransportError> {
        match self.framing {
            Framing::Text => {
                let text = String::from_utf8(data.to_vec()).map_err(|e| {
                    TransportError::SendFailed(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        e,
                    ))
                })?;
                Ok(Message::Text(text.into()))
            }
            Framing::Binary => Ok(Message::Binary(data.to_vec().into())),
        }
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let msg = self.frame(data)?;
        self.sink.lock().await.send(msg).await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(data.into()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.sink.lock().await.close().await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
