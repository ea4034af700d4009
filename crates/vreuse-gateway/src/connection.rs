use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vreuse_types::api::Claims;
use vreuse_types::events::{GatewayCommand, GatewayEvent};

use crate::presence::ConnectionHandle;
use crate::router::DeliveryRouter;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long a fresh socket may stay silent before it identifies.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Drive one WebSocket: Identify handshake, presence registration, then the
/// command/event loop until either side goes away.
pub async fn handle_connection(socket: WebSocket, router: DeliveryRouter, jwt_secret: Arc<str>) {
    let (mut sender, mut receiver) = socket.split();

    let user_id = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(id) => id,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    let (handle, events_rx) = ConnectionHandle::new();
    let presence = router.presence().clone();

    // Last writer wins. The superseded socket is left to its own heartbeat.
    if let Some(old) = presence.register(user_id, handle.clone()).await {
        info!("{} reconnected, connection {} superseded by {}", user_id, old, handle.id());
    }
    info!(
        "{} connected to gateway on {} ({} online)",
        user_id,
        handle.id(),
        presence.online_count().await
    );

    let ready = to_frame(&GatewayEvent::Ready { user_id });
    let ready_sent = match ready {
        Some(frame) => sender.send(frame).await.is_ok(),
        None => false,
    };

    if ready_sent {
        run_connection_loop(sender, receiver, events_rx, router, user_id).await;
    }

    presence.unregister(&handle).await;
    info!("{} disconnected from gateway ({})", user_id, handle.id());
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut events_rx: tokio::sync::mpsc::UnboundedReceiver<GatewayEvent>,
    router: DeliveryRouter,
    user_id: Uuid,
) {
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    // Forward pushed events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = events_rx.recv() => {
                    let Some(event) = event else { break };
                    let Some(frame) = to_frame(&event) else { continue };
                    if sender.send(frame).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client. Each command runs to completion before the
    // next is read, so one connection's sends are stored in order.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&router, user_id, cmd).await,
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {:.200}",
                            user_id,
                            e,
                            text.as_str()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

async fn handle_command(router: &DeliveryRouter, user_id: Uuid, cmd: GatewayCommand) {
    match cmd {
        GatewayCommand::Identify { .. } => {
            debug!("{} sent Identify on an identified connection, ignoring", user_id);
        }

        GatewayCommand::Send {
            conversation_id,
            sender_id,
            text,
        } => {
            // A connection may only speak for the user it identified as.
            if let Ok(claimed) = sender_id.parse::<Uuid>() {
                if claimed != user_id {
                    warn!("{} tried to send as {}, dropping", user_id, claimed);
                    return;
                }
            }
            router.route(&conversation_id, &sender_id, &text).await;
        }
    }
}

async fn wait_for_identify(receiver: &mut SplitStream<WebSocket>, jwt_secret: &str) -> Option<Uuid> {
    let timeout = tokio::time::timeout(IDENTIFY_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some(token_data.claims.sub);
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

fn to_frame(event: &GatewayEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            error!("Failed to encode gateway event: {}", e);
            None
        }
    }
}
