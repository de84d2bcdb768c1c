use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::realtime::{ChannelEvent, LocationPublish, OutboundFrame, RealtimeChannel};

const RECONNECT_STEP: Duration = Duration::from_secs(1);
const MAX_RECONNECT_STEPS: u32 = 30;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, PartialEq, Eq)]
enum ConnectionEnd {
    Dropped,
    Shutdown,
}

/// The platform's channel over a websocket. A supervisor task keeps the
/// connection up, backing off linearly, and rejoins every room it held.
pub struct WsChannel {
    outbound: mpsc::Sender<OutboundFrame>,
    events: broadcast::Sender<ChannelEvent>,
    rooms: Arc<Mutex<HashSet<String>>>,
    supervisor: JoinHandle<()>,
}

impl WsChannel {
    pub fn connect(url: impl Into<String>, buffer: usize) -> Self {
        Self::with_backoff(url, buffer, RECONNECT_STEP)
    }

    pub(crate) fn with_backoff(url: impl Into<String>, buffer: usize, step: Duration) -> Self {
        let buffer = buffer.max(1);
        let (outbound, outbound_rx) = mpsc::channel(buffer);
        let (events, _unused_rx) = broadcast::channel(buffer);
        let rooms = Arc::new(Mutex::new(HashSet::new()));

        let supervisor = tokio::spawn(supervise(
            url.into(),
            step,
            rooms.clone(),
            outbound_rx,
            events.clone(),
        ));

        Self {
            outbound,
            events,
            rooms,
            supervisor,
        }
    }

    fn enqueue(&self, frame: OutboundFrame) -> Result<(), AppError> {
        match self.outbound.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(frame)) => {
                warn!(?frame, "realtime outbound queue full; frame dropped");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(AppError::Network("realtime channel is closed".to_string()))
            }
        }
    }

    fn update_rooms(&self, apply: impl FnOnce(&mut HashSet<String>)) {
        let mut rooms = self.rooms.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        apply(&mut rooms);
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.supervisor.abort();
    }
}

#[async_trait]
impl RealtimeChannel for WsChannel {
    async fn join(&self, delivery_id: &str) -> Result<(), AppError> {
        self.update_rooms(|rooms| {
            rooms.insert(delivery_id.to_string());
        });
        self.enqueue(OutboundFrame::Join(delivery_id.to_string()))
    }

    async fn leave(&self, delivery_id: &str) -> Result<(), AppError> {
        self.update_rooms(|rooms| {
            rooms.remove(delivery_id);
        });
        self.enqueue(OutboundFrame::Leave(delivery_id.to_string()))
    }

    async fn publish_location(&self, update: &LocationPublish) -> Result<(), AppError> {
        self.enqueue(OutboundFrame::Location(update.clone()))
    }

    fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }
}

async fn supervise(
    url: String,
    step: Duration,
    rooms: Arc<Mutex<HashSet<String>>>,
    mut outbound: mpsc::Receiver<OutboundFrame>,
    events: broadcast::Sender<ChannelEvent>,
) {
    let mut failures: u32 = 0;

    loop {
        match connect_async(url.as_str()).await {
            Ok((socket, _response)) => {
                info!(url = %url, "realtime channel connected");
                failures = 0;
                if run_connection(socket, &rooms, &mut outbound, &events).await
                    == ConnectionEnd::Shutdown
                {
                    info!("realtime channel shut down");
                    return;
                }
                warn!(url = %url, "realtime channel dropped");
            }
            Err(err) => {
                warn!(url = %url, error = %err, "realtime channel connect failed");
            }
        }

        failures = failures.saturating_add(1);
        let delay = step * failures.min(MAX_RECONNECT_STEPS);
        debug!(delay_ms = delay.as_millis() as u64, "reconnecting realtime channel");
        tokio::time::sleep(delay).await;
    }
}

async fn run_connection(
    socket: Socket,
    rooms: &Mutex<HashSet<String>>,
    outbound: &mut mpsc::Receiver<OutboundFrame>,
    events: &broadcast::Sender<ChannelEvent>,
) -> ConnectionEnd {
    let (mut sink, mut stream) = socket.split();

    let held: Vec<String> = rooms
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .iter()
        .cloned()
        .collect();
    for delivery_id in held {
        let frame = OutboundFrame::Join(delivery_id).to_text();
        if sink.send(Message::Text(frame)).await.is_err() {
            return ConnectionEnd::Dropped;
        }
    }

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    let _ = sink.close().await;
                    return ConnectionEnd::Shutdown;
                };
                if let Err(err) = sink.send(Message::Text(frame.to_text())).await {
                    warn!(error = %err, "realtime send failed");
                    return ConnectionEnd::Dropped;
                }
            }
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => match ChannelEvent::parse_frame(&text) {
                    Ok(Some(event)) => {
                        let _ = events.send(event);
                    }
                    Ok(None) => {}
                    Err(err) => warn!(error = %err, "unreadable realtime frame"),
                },
                Some(Ok(Message::Close(_))) | None => return ConnectionEnd::Dropped,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(error = %err, "realtime receive failed");
                    return ConnectionEnd::Dropped;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{accept_async, WebSocketStream};

    use super::WsChannel;
    use crate::realtime::{ChannelEvent, RealtimeChannel};

    async fn next_frame(socket: &mut WebSocketStream<TcpStream>) -> Value {
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("socket ended: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn joins_receives_and_rejoins_after_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        let channel = WsChannel::with_backoff(url, 16, Duration::from_millis(10));
        let mut events = channel.events();
        channel.join("d-1").await.unwrap();

        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = accept_async(stream).await.unwrap();

        let join = tokio::time::timeout(Duration::from_secs(5), next_frame(&mut socket))
            .await
            .unwrap();
        assert_eq!(join["event"], "joinDelivery");
        assert_eq!(join["data"]["deliveryId"], "d-1");

        let push = json!({
            "event": "locationUpdate:d-1",
            "data": { "lat": 12.91, "lng": 77.61, "lastUpdated": "2024-05-01T10:00:00Z" }
        });
        socket.send(Message::Text(push.to_string())).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, ChannelEvent::Location(ref update) if update.delivery_id == "d-1"));

        drop(socket);

        let (stream, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
            .await
            .unwrap()
            .unwrap();
        let mut socket = accept_async(stream).await.unwrap();
        let rejoin = tokio::time::timeout(Duration::from_secs(5), next_frame(&mut socket))
            .await
            .unwrap();
        assert_eq!(rejoin["event"], "joinDelivery");
        assert_eq!(rejoin["data"]["deliveryId"], "d-1");
    }
}
