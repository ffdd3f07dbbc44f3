use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{info, warn};

use crate::application::dto::{ChannelEvent, ClientMessage, DetectRequest, ServerPush};
use crate::application::ports::DetectionChannelPort;
use crate::domain::errors::{DomainError, DomainResult};

/// Capacidad del canal de difusión de eventos hacia la interfaz.
const EVENT_CAPACITY: usize = 64;

/// Canal de detección sobre WebSocket. El servidor empuja JSON etiquetado
/// por `type`; el cliente emite `detect`. Las transiciones de transporte se
/// difunden como `Connected` / `Disconnected` junto a los push.
pub struct WsDetectionChannel {
    url: String,
    connected: Arc<AtomicBool>,
    events: broadcast::Sender<ChannelEvent>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    // Serializa los connect concurrentes para mantener la idempotencia.
    connect_guard: tokio::sync::Mutex<()>,
}

impl WsDetectionChannel {
    pub fn new(url: &str) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            url: url.to_string(),
            connected: Arc::new(AtomicBool::new(false)),
            events,
            outbound: Mutex::new(None),
            connect_guard: tokio::sync::Mutex::new(()),
        }
    }

    fn dispatch_text(events: &broadcast::Sender<ChannelEvent>, text: &str) {
        match serde_json::from_str::<ServerPush>(text) {
            Ok(push) => {
                let _ = events.send(ChannelEvent::Push(push));
            }
            Err(e) => warn!("Mensaje del canal no reconocido: {e}"),
        }
    }
}

#[async_trait]
impl DetectionChannelPort for WsDetectionChannel {
    async fn connect(&self) -> DomainResult<()> {
        let _guard = self.connect_guard.lock().await;
        if self.connected.load(Ordering::SeqCst) {
            // Ya hay canal: conectar otra vez es un no-op.
            return Ok(());
        }

        let (stream, _) = connect_async(self.url.clone())
            .await
            .map_err(|e| DomainError::Transport(format!("No se pudo abrir {}: {e}", self.url)))?;
        let (mut write, mut read) = stream.split();

        let (tx_out, mut rx_out) = mpsc::unbounded_channel::<Message>();
        *self.outbound.lock().unwrap() = Some(tx_out);
        self.connected.store(true, Ordering::SeqCst);
        let _ = self.events.send(ChannelEvent::Connected);
        info!("🔌 Canal de detección conectado a {}", self.url);

        // Tarea de escritura: vuelca la cola de salida al socket.
        tokio::spawn(async move {
            while let Some(msg) = rx_out.recv().await {
                if write.send(msg).await.is_err() {
                    break;
                }
            }
        });

        // Tarea de lectura: deserializa los push y los difunde. Al cerrarse
        // el socket marca el canal como caído.
        let events = self.events.clone();
        let connected = self.connected.clone();
        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => Self::dispatch_text(&events, &text),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Canal de detección: {e}");
                        break;
                    }
                }
            }
            connected.store(false, Ordering::SeqCst);
            let _ = events.send(ChannelEvent::Disconnected);
            info!("Canal de detección desconectado");
        });

        Ok(())
    }

    async fn subscribe(&self) -> DomainResult<broadcast::Receiver<ChannelEvent>> {
        Ok(self.events.subscribe())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn emit_detect(&self, request: &DetectRequest) -> DomainResult<()> {
        let json = serde_json::to_string(&ClientMessage::Detect(request.clone()))
            .map_err(|e| DomainError::OperationFailed(e.to_string()))?;
        let sender = self
            .outbound
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| DomainError::Transport("El canal no está conectado".to_string()))?;
        sender
            .send(Message::Text(json))
            .map_err(|e| DomainError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dispatch_ignores_unknown_messages_and_forwards_pushes() {
        let (events, mut rx) = broadcast::channel(8);

        WsDetectionChannel::dispatch_text(&events, "esto no es JSON");
        WsDetectionChannel::dispatch_text(&events, r#"{"type":"algo_raro"}"#);
        WsDetectionChannel::dispatch_text(
            &events,
            r#"{"type":"detection_error","error":"sin detector"}"#,
        );

        match rx.try_recv().unwrap() {
            ChannelEvent::Push(ServerPush::DetectionError { error }) => {
                assert_eq!(error, "sin detector");
            }
            other => panic!("evento inesperado: {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn emit_without_connection_fails_with_transport_error() {
        let channel = WsDetectionChannel::new("ws://127.0.0.1:1/ws");
        let request = DetectRequest {
            image_path: "/uploads/a.jpg".to_string(),
            rule_name: None,
        };
        assert!(matches!(
            channel.emit_detect(&request).await,
            Err(DomainError::Transport(_))
        ));
        assert!(!channel.is_connected());
    }
}
