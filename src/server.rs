use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::ws::{self, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::any;
use axum::Router;
use burn::tensor::backend::Backend;
use log::{error, info, warn};

use crate::interface::{ClientEvent, ServerEvent};
use crate::recognizer::Recognizer;

/// The WebSocket front door of the recognizer.
///
/// One route, `/ws`; each connection gets its own task and talks JSON
/// events. All connections share one recognizer behind a mutex: module
/// parameters are materialized lazily, so the instance cannot be shared
/// across threads without the lock, and a forward pass holds it for its
/// duration. No per-connection state is kept; connect and disconnect are
/// only logged.
pub struct WsServer<B: Backend> {
    recognizer: Arc<Mutex<Recognizer<B>>>,
}

impl<B: Backend> Clone for WsServer<B> {
    fn clone(&self) -> Self {
        Self {
            recognizer: self.recognizer.clone(),
        }
    }
}

impl<B: Backend> WsServer<B>
where
    Recognizer<B>: Send + 'static,
{
    pub fn new(recognizer: Recognizer<B>) -> Self {
        Self {
            recognizer: Arc::new(Mutex::new(recognizer)),
        }
    }

    /// Bind the listener and serve until the process is stopped.
    /// Any client may connect; there is no authentication or rate limit.
    pub async fn serve(self, host: &str, port: u16) -> anyhow::Result<()> {
        let address = format!("{host}:{port}");
        info!("Serving digit recognition on ws://{address}/ws");

        let app = Router::new()
            .route("/ws", any(Self::handler))
            .with_state(self);

        let listener = tokio::net::TcpListener::bind(&address).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;

        Ok(())
    }

    async fn handler(ws: WebSocketUpgrade, State(state): State<Self>) -> impl IntoResponse {
        ws.on_upgrade(move |socket| state.handle_socket(socket))
    }

    async fn handle_socket(self, mut socket: WebSocket) {
        info!("Client connected");

        while let Some(msg) = socket.recv().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    warn!("Socket error, dropping connection: {e}");
                    break;
                }
            };

            match msg {
                ws::Message::Text(text) => {
                    let reply = self.handle_event(text.as_str()).await;
                    let json = match serde_json::to_string(&reply) {
                        Ok(json) => json,
                        Err(e) => {
                            error!("Failed to serialize reply: {e}");
                            continue;
                        }
                    };
                    if socket.send(ws::Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                ws::Message::Close(_) => break,
                // Pings are answered by axum itself; binary frames are
                // not part of the protocol.
                _ => {}
            }
        }

        info!("Client disconnected");
    }

    /// Handle one inbound event and produce the reply to send back on the
    /// same connection. Every failure maps to an explicit error event;
    /// nothing here can take the process down.
    pub async fn handle_event(&self, text: &str) -> ServerEvent {
        let event: ClientEvent = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(e) => {
                warn!("Unrecognized client message: {e}");
                return ServerEvent::Error {
                    message: format!("Unrecognized message: {e}"),
                };
            }
        };

        match event {
            ClientEvent::DrawData { image } => {
                let recognizer = self.recognizer.clone();
                // The forward pass is synchronous CPU work; run it off the
                // event loop so it never stalls socket traffic. The lock
                // serializes concurrent predictions.
                let outcome = tokio::task::spawn_blocking(move || {
                    recognizer.lock().unwrap().predict(&image)
                })
                .await;

                match outcome {
                    Ok(Ok(probabilities)) => ServerEvent::Prediction { probabilities },
                    Ok(Err(e)) => {
                        if e.is_request_scoped() {
                            warn!("Error processing image: {e}");
                        } else {
                            error!("Unexpected failure during prediction: {e}");
                        }
                        ServerEvent::Error {
                            message: e.to_string(),
                        }
                    }
                    Err(e) => {
                        error!("Inference task failed: {e}");
                        ServerEvent::Error {
                            message: "Internal error".to_string(),
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelConfig;
    use crate::preprocessing::ChannelPolicy;
    use base64::{engine::general_purpose, Engine as _};
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    type TestBackend = burn::backend::NdArray<f32>;

    fn test_server() -> WsServer<TestBackend> {
        let device = Default::default();
        let model = ModelConfig::new().init(&device);
        WsServer::new(Recognizer::with_model(
            model,
            device,
            ChannelPolicy::AlphaAsInk,
        ))
    }

    fn blank_canvas_event() -> String {
        let img = RgbaImage::from_pixel(28, 28, Rgba([0, 0, 0, 0]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        let image = format!(
            "data:image/png;base64,{}",
            general_purpose::STANDARD.encode(buf)
        );
        serde_json::to_string(&ClientEvent::DrawData { image }).unwrap()
    }

    #[tokio::test]
    async fn blank_draw_data_round_trip() {
        let server = test_server();

        let reply = server.handle_event(&blank_canvas_event()).await;

        assert_eq!(
            reply,
            ServerEvent::Prediction {
                probabilities: vec![0.1; 10]
            }
        );
    }

    #[tokio::test]
    async fn concurrent_draw_events_both_get_replies() {
        let server = test_server();
        let event = blank_canvas_event();

        let (first, second) =
            tokio::join!(server.handle_event(&event), server.handle_event(&event));

        assert_eq!(
            first,
            ServerEvent::Prediction {
                probabilities: vec![0.1; 10]
            }
        );
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn bad_payload_gets_an_error_event() {
        let server = test_server();
        let event = r#"{"event":"draw_data","image":"data:image/png;base64,@@@@"}"#;

        let reply = server.handle_event(event).await;

        assert!(matches!(reply, ServerEvent::Error { .. }));
    }

    #[tokio::test]
    async fn unknown_event_gets_an_error_event() {
        let server = test_server();

        let reply = server.handle_event(r#"{"event":"resize","w":56}"#).await;

        assert!(matches!(reply, ServerEvent::Error { .. }));
    }
}
