// gateway/src/ws.rs
//! WebSocket passthrough: the client's socket is bridged frame by frame to
//! the upstream application.
use actix::{Actor, ActorContext, AsyncContext, Handler, Message, StreamHandler};
use actix_web::{http::header, web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use futures::{SinkExt, StreamExt};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tungstenite::client::IntoClientRequest;
use tungstenite::handshake::client::Request as UpstreamRequest;
use tungstenite::http::{HeaderName, HeaderValue};
use tungstenite::protocol::Message as WsMessage;
use url::Url;

use crate::error::GatewayError;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);
/// Upper bound for the upstream TCP + WebSocket handshake.
const UPSTREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Frames and lifecycle events coming back from the upstream socket.
#[derive(Message)]
#[rtype(result = "()")]
pub enum UpstreamEvent {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Close,
    Disconnected,
}

pub fn is_upgrade(req: &HttpRequest) -> bool {
    req.headers()
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v.eq_ignore_ascii_case("websocket"))
}

/// `http(s)://` upstream URL turned into its `ws(s)://` counterpart.
pub fn upstream_ws_url(mut url: Url) -> Result<Url, GatewayError> {
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    url.set_scheme(scheme)
        .map_err(|_| GatewayError::WebSocket(format!("cannot use {} for websockets", url)))?;
    Ok(url)
}

/// Bridges one client socket to one upstream socket.
pub struct WsBridge {
    request_id: String,
    upstream_request: Option<UpstreamRequest>,
    upstream_sink: Option<mpsc::Sender<WsMessage>>,
    last_heartbeat: Instant,
}

impl WsBridge {
    pub fn new(request_id: String, upstream_request: UpstreamRequest) -> Self {
        Self {
            request_id,
            upstream_request: Some(upstream_request),
            upstream_sink: None,
            last_heartbeat: Instant::now(),
        }
    }

    // Drop the bridge when the client stops answering pings
    fn heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                tracing::warn!(request_id = %act.request_id, "WebSocket client heartbeat timeout");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn connect_upstream(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(request) = self.upstream_request.take() else {
            return;
        };

        let (tx, mut rx) = mpsc::channel::<WsMessage>(100);
        self.upstream_sink = Some(tx);

        let addr = ctx.address();
        let request_id = self.request_id.clone();

        let fut = async move {
            match open_upstream(request, UPSTREAM_CONNECT_TIMEOUT).await {
                Ok(ws_stream) => {
                    let (mut ws_sink, mut ws_stream) = ws_stream.split();

                    // Client -> upstream
                    tokio::spawn(async move {
                        while let Some(msg) = rx.recv().await {
                            let closing = matches!(msg, WsMessage::Close(_));
                            if let Err(e) = ws_sink.send(msg).await {
                                tracing::debug!("Error sending to upstream socket: {}", e);
                                break;
                            }
                            if closing {
                                break;
                            }
                        }
                    });

                    // Upstream -> client
                    while let Some(msg) = ws_stream.next().await {
                        match msg {
                            Ok(WsMessage::Text(text)) => addr.do_send(UpstreamEvent::Text(text)),
                            Ok(WsMessage::Binary(data)) => addr.do_send(UpstreamEvent::Binary(data)),
                            Ok(WsMessage::Ping(data)) => addr.do_send(UpstreamEvent::Ping(data)),
                            Ok(WsMessage::Pong(_)) | Ok(WsMessage::Frame(_)) => {}
                            Ok(WsMessage::Close(_)) => {
                                addr.do_send(UpstreamEvent::Close);
                                return;
                            }
                            Err(e) => {
                                tracing::warn!(request_id = %request_id, "Upstream socket error: {}", e);
                                break;
                            }
                        }
                    }
                    addr.do_send(UpstreamEvent::Disconnected);
                }
                Err(e) => {
                    tracing::error!(request_id = %request_id, "Failed to connect to upstream socket: {}", e);
                    addr.do_send(UpstreamEvent::Disconnected);
                }
            }
        };

        actix::spawn(fut);
    }

    fn forward(&mut self, msg: WsMessage, ctx: &mut ws::WebsocketContext<Self>) {
        match &self.upstream_sink {
            Some(tx) => {
                if tx.try_send(msg).is_err() {
                    tracing::warn!(request_id = %self.request_id, "Upstream socket is not keeping up; closing");
                    ctx.stop();
                }
            }
            None => ctx.stop(),
        }
    }
}

impl Actor for WsBridge {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::debug!(request_id = %self.request_id, "WebSocket bridge started");
        self.heartbeat(ctx);
        self.connect_upstream(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(tx) = self.upstream_sink.take() {
            let _ = tx.try_send(WsMessage::Close(None));
        }
        tracing::debug!(request_id = %self.request_id, "WebSocket bridge stopped");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsBridge {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        self.last_heartbeat = Instant::now();

        match msg {
            Ok(ws::Message::Ping(msg)) => ctx.pong(&msg),
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Text(text)) => self.forward(WsMessage::Text(text.to_string()), ctx),
            Ok(ws::Message::Binary(bin)) => self.forward(WsMessage::Binary(bin.to_vec()), ctx),
            Ok(ws::Message::Close(reason)) => {
                if let Some(tx) = self.upstream_sink.take() {
                    let _ = tx.try_send(WsMessage::Close(None));
                }
                ctx.close(reason);
                ctx.stop();
            }
            // Fragmented frames are not relayed
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => {}
            Err(e) => {
                tracing::warn!(request_id = %self.request_id, "WebSocket protocol error: {}", e);
                ctx.stop();
            }
        }
    }
}

impl Handler<UpstreamEvent> for WsBridge {
    type Result = ();

    fn handle(&mut self, msg: UpstreamEvent, ctx: &mut Self::Context) -> Self::Result {
        match msg {
            UpstreamEvent::Text(text) => ctx.text(text),
            UpstreamEvent::Binary(data) => ctx.binary(data),
            UpstreamEvent::Ping(data) => ctx.ping(&data),
            UpstreamEvent::Close => {
                ctx.close(None);
                ctx.stop();
            }
            UpstreamEvent::Disconnected => {
                tracing::debug!(request_id = %self.request_id, "Upstream socket closed");
                self.upstream_sink = None;
                ctx.close(None);
                ctx.stop();
            }
        }
    }
}

/// Open the upstream socket, giving up after `limit`.
pub async fn open_upstream(
    request: UpstreamRequest,
    limit: Duration,
) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>, GatewayError> {
    match tokio::time::timeout(limit, connect_async(request)).await {
        Ok(Ok((ws_stream, _))) => Ok(ws_stream),
        Ok(Err(e)) => Err(GatewayError::WebSocket(e.to_string())),
        Err(_) => Err(GatewayError::WebSocket(format!(
            "upstream handshake did not finish within {}s",
            limit.as_secs()
        ))),
    }
}

/// Build the upstream handshake request and start the bridge.
///
/// `headers` are the already-filtered headers to pass along (cookies,
/// forwarding headers, identity assertion).
pub fn bridge(
    req: &HttpRequest,
    stream: web::Payload,
    upstream_url: Url,
    headers: Vec<(String, String)>,
    request_id: String,
) -> Result<HttpResponse, GatewayError> {
    let ws_url = upstream_ws_url(upstream_url)?;
    let mut upstream_request = ws_url
        .as_str()
        .into_client_request()
        .map_err(|e| GatewayError::WebSocket(e.to_string()))?;

    for (name, value) in headers {
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) else {
            continue;
        };
        upstream_request.headers_mut().insert(name, value);
    }

    tracing::debug!(request_id = %request_id, upstream = %ws_url, "Bridging WebSocket upgrade");
    ws::start(WsBridge::new(request_id, upstream_request), req, stream)
        .map_err(|e| GatewayError::WebSocket(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_ws_scheme_mapping() {
        let url = upstream_ws_url(Url::parse("http://app:3000/app/_next/webpack-hmr").unwrap()).unwrap();
        assert_eq!(url.as_str(), "ws://app:3000/app/_next/webpack-hmr");

        let url = upstream_ws_url(Url::parse("https://app.internal/socket").unwrap()).unwrap();
        assert_eq!(url.as_str(), "wss://app.internal/socket");
    }

    #[tokio::test]
    async fn test_upstream_connect_is_bounded() {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _hold = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let request = format!("ws://{}/socket", addr).into_client_request().unwrap();
        let started = Instant::now();
        let result = open_upstream(request, Duration::from_millis(200)).await;
        assert!(matches!(result, Err(GatewayError::WebSocket(_))));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_upgrade_detection() {
        let req = TestRequest::default()
            .insert_header((header::UPGRADE, "WebSocket"))
            .to_http_request();
        assert!(is_upgrade(&req));
        assert!(!is_upgrade(&TestRequest::default().to_http_request()));
    }
}
