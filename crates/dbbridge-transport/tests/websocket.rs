//! Integration tests for the WebSocket client connection.
//!
//! Each test spins up a real WebSocket server on a random port with
//! `tokio-tungstenite` and drives the client side through the
//! [`Connection`] trait.

#[cfg(feature = "websocket")]
mod websocket {
    use dbbridge_transport::{Connection, WebSocketConnection};
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::tungstenite::handshake::server::{
        ErrorResponse, Request, Response,
    };
    use tokio_tungstenite::tungstenite::http::HeaderValue;

    type ServerWs = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    /// Binds a listener on a random port and returns it with its address.
    async fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    /// Accepts one client and agrees to the WAMP JSON subprotocol.
    async fn accept_wamp(listener: TcpListener) -> ServerWs {
        let (stream, _) = listener.accept().await.expect("should accept");
        let callback = |_req: &Request, mut resp: Response| {
            resp.headers_mut().insert(
                "Sec-WebSocket-Protocol",
                HeaderValue::from_static("wamp.2.json"),
            );
            Ok::<Response, ErrorResponse>(resp)
        };
        tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .expect("handshake should succeed")
    }

    #[tokio::test]
    async fn test_connect_negotiates_subprotocol_and_exchanges_text() {
        let (listener, addr) = listener().await;
        let server = tokio::spawn(accept_wamp(listener));

        let conn = WebSocketConnection::connect(
            &format!("ws://{addr}/ws"),
            "wamp.2.json",
        )
        .await
        .expect("client should connect");
        let mut server_ws = server.await.expect("task should complete");

        assert_eq!(conn.subprotocol(), Some("wamp.2.json"));
        assert!(conn.id().into_inner() > 0);

        // --- Client sends, server receives a text frame ---
        conn.send(br#"[1,"realm1",{}]"#)
            .await
            .expect("send should succeed");
        let msg = server_ws.next().await.unwrap().unwrap();
        assert!(msg.is_text(), "JSON subprotocol must use text frames");
        assert_eq!(msg.into_text().unwrap().as_str(), r#"[1,"realm1",{}]"#);

        // --- Server sends, client receives ---
        server_ws
            .send(Message::Text(r#"[2,7,{}]"#.into()))
            .await
            .unwrap();
        let received = conn
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        assert_eq!(received, br#"[2,7,{}]"#);

        conn.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_recv_returns_none_on_server_close() {
        let (listener, addr) = listener().await;
        let server = tokio::spawn(accept_wamp(listener));

        let conn = WebSocketConnection::connect(
            &format!("ws://{addr}/ws"),
            "wamp.2.json",
        )
        .await
        .expect("client should connect");
        let mut server_ws = server.await.unwrap();

        server_ws.send(Message::Close(None)).await.unwrap();

        let result = conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on server close");
    }

    #[tokio::test]
    async fn test_send_and_recv_run_concurrently() {
        // A receiver parked in recv() must not block senders.
        let (listener, addr) = listener().await;
        let server = tokio::spawn(accept_wamp(listener));

        let conn = std::sync::Arc::new(
            WebSocketConnection::connect(
                &format!("ws://{addr}/ws"),
                "wamp.2.json",
            )
            .await
            .expect("client should connect"),
        );
        let mut server_ws = server.await.unwrap();

        let reader = {
            let conn = std::sync::Arc::clone(&conn);
            tokio::spawn(async move { conn.recv().await })
        };

        // Give the reader time to park on the stream lock.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        tokio::time::timeout(
            std::time::Duration::from_secs(2),
            conn.send(b"[6,{},\"wamp.close.normal\"]"),
        )
        .await
        .expect("send must not wait on the reader")
        .expect("send should succeed");

        let echoed = server_ws.next().await.unwrap().unwrap();
        server_ws.send(echoed).await.unwrap();

        let received = reader.await.unwrap().unwrap().unwrap();
        assert_eq!(received, b"[6,{},\"wamp.close.normal\"]");
    }

    #[tokio::test]
    async fn test_connect_rejects_malformed_url() {
        let result =
            WebSocketConnection::connect("not a url", "wamp.2.json").await;

        assert!(matches!(
            result,
            Err(dbbridge_transport::TransportError::InvalidEndpoint { .. })
        ));
    }
}
