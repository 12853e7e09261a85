//! WebSocket upgrade handler

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{Direction, Role, SessionRegistry};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Per-connection buffer between the reader loop and the socket writer
const OUTBOX_CAPACITY: usize = 128;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let participant_id = Uuid::new_v4();
    info!(participant_id = %participant_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        participant_id,
        server_time: unix_millis(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(participant_id = %participant_id, error = %e, "Failed to send welcome");
        return;
    }

    let (outbox, outbox_rx) = mpsc::channel::<ServerMsg>(OUTBOX_CAPACITY);
    let writer_handle = tokio::spawn(run_writer(participant_id, ws_sink, outbox_rx));

    let mut conn = Connection::new(participant_id, state.registry.clone(), outbox);
    run_session(&mut conn, ws_stream).await;

    // Transport gone: treat as an explicit leave
    conn.disconnect();
    writer_handle.abort();

    info!(participant_id = %participant_id, "WebSocket connection closed");
}

/// What woke the reader loop
enum Step {
    Frame(Option<Result<Message, axum::Error>>),
    Event(Result<ServerMsg, broadcast::error::RecvError>),
}

/// Reader loop: WebSocket frames -> registry, session events -> outbox
async fn run_session(conn: &mut Connection, mut ws_stream: SplitStream<WebSocket>) {
    let mut rate_limiter = ConnectionRateLimiter::new();
    let participant_id = conn.participant_id;

    loop {
        let step = tokio::select! {
            frame = ws_stream.next() => Step::Frame(frame),
            event = next_event(&mut conn.events) => Step::Event(event),
        };

        match step {
            Step::Event(Ok(msg)) => {
                if !conn.deliver(msg).await {
                    debug!(participant_id = %participant_id, "Outbox closed");
                    break;
                }
            }
            Step::Event(Err(broadcast::error::RecvError::Lagged(n))) => {
                warn!(
                    participant_id = %participant_id,
                    lagged_count = n,
                    "Client lagged, skipping {} events", n
                );
            }
            Step::Event(Err(broadcast::error::RecvError::Closed)) => {
                debug!(participant_id = %participant_id, "Session event channel closed");
                conn.events = None;
            }
            Step::Frame(Some(Ok(Message::Text(text)))) => {
                if !rate_limiter.admit_frame() {
                    warn!(participant_id = %participant_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(ClientMsg::JoinGame { .. }) if !rate_limiter.admit_join() => {
                        warn!(participant_id = %participant_id, "Rate limited join request");
                    }
                    Ok(client_msg) => {
                        if !conn.handle(client_msg).await {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(
                            participant_id = %participant_id,
                            error = %e,
                            "Failed to parse client message"
                        );
                    }
                }
            }
            Step::Frame(Some(Ok(Message::Binary(_)))) => {
                warn!(participant_id = %participant_id, "Received binary message, ignoring");
            }
            Step::Frame(Some(Ok(Message::Ping(_)))) | Step::Frame(Some(Ok(Message::Pong(_)))) => {}
            Step::Frame(Some(Ok(Message::Close(_)))) => {
                info!(participant_id = %participant_id, "Client initiated close");
                break;
            }
            Step::Frame(Some(Err(e))) => {
                error!(participant_id = %participant_id, error = %e, "WebSocket error");
                break;
            }
            Step::Frame(None) => break,
        }
    }

    if rate_limiter.dropped() > 0 {
        info!(
            participant_id = %participant_id,
            dropped = rate_limiter.dropped(),
            "Connection had rate limited frames"
        );
    }
}

/// Next event of the joined session; never resolves while not in a session
async fn next_event(
    events: &mut Option<broadcast::Receiver<ServerMsg>>,
) -> Result<ServerMsg, broadcast::error::RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Writer task: outbox -> WebSocket
async fn run_writer(
    participant_id: Uuid,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut outbox_rx: mpsc::Receiver<ServerMsg>,
) {
    while let Some(msg) = outbox_rx.recv().await {
        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            debug!(participant_id = %participant_id, error = %e, "WebSocket send failed");
            break;
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}

/// One participant's view of the registry: at most one joined session
struct Connection {
    participant_id: Uuid,
    registry: Arc<SessionRegistry>,
    outbox: mpsc::Sender<ServerMsg>,
    game_id: Option<String>,
    events: Option<broadcast::Receiver<ServerMsg>>,
}

impl Connection {
    fn new(
        participant_id: Uuid,
        registry: Arc<SessionRegistry>,
        outbox: mpsc::Sender<ServerMsg>,
    ) -> Self {
        Self {
            participant_id,
            registry,
            outbox,
            game_id: None,
            events: None,
        }
    }

    /// Queue a message for the socket; false once the writer is gone
    async fn deliver(&self, msg: ServerMsg) -> bool {
        self.outbox.send(msg).await.is_ok()
    }

    /// Dispatch one inbound message; false once the writer is gone
    async fn handle(&mut self, msg: ClientMsg) -> bool {
        match msg {
            ClientMsg::JoinGame { game_id, role } => self.join(game_id, role).await,
            ClientMsg::Input { game_id, direction } => {
                self.input(&game_id, direction);
                true
            }
            ClientMsg::LeaveGame { game_id } => self.leave(&game_id).await,
            ClientMsg::Ping { t } => self.deliver(ServerMsg::Pong { t }).await,
        }
    }

    async fn join(&mut self, game_id: String, role: Role) -> bool {
        if self.game_id.as_deref() == Some(game_id.as_str()) {
            debug!(participant_id = %self.participant_id, game_id = %game_id, "Already in session");
            return true;
        }
        if let Some(current) = self.game_id.clone() {
            if !self.leave(&current).await {
                return false;
            }
        }

        match self.registry.join(&game_id, self.participant_id, role) {
            Ok((_, rx)) => {
                self.game_id = Some(game_id);
                self.events = Some(rx);
            }
            Err(reason) => {
                debug!(
                    participant_id = %self.participant_id,
                    game_id = %game_id,
                    %reason,
                    "Join ignored"
                );
            }
        }
        true
    }

    fn input(&self, game_id: &str, direction: Direction) {
        let Some(session) = self.registry.get(game_id) else {
            debug!(
                participant_id = %self.participant_id,
                game_id = %game_id,
                "Input for unknown session"
            );
            return;
        };
        if let Err(reason) = session.set_direction(self.participant_id, direction) {
            debug!(
                participant_id = %self.participant_id,
                game_id = %game_id,
                %reason,
                "Input ignored"
            );
        }
    }

    /// Leave and flush whatever the session emitted up to and including the
    /// departure, so the leaver still sees the outcome.
    async fn leave(&mut self, game_id: &str) -> bool {
        self.registry.leave(game_id, self.participant_id);

        if self.game_id.as_deref() != Some(game_id) {
            return true;
        }
        self.game_id = None;

        let Some(mut rx) = self.events.take() else {
            return true;
        };
        loop {
            match rx.try_recv() {
                Ok(msg) => {
                    if !self.deliver(msg).await {
                        return false;
                    }
                }
                Err(TryRecvError::Lagged(n)) => {
                    warn!(
                        participant_id = %self.participant_id,
                        lagged_count = n,
                        "Leaver lagged, skipping {} events", n
                    );
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return true,
            }
        }
    }

    fn disconnect(&mut self) {
        if let Some(game_id) = self.game_id.take() {
            self.registry.leave(&game_id, self.participant_id);
        }
        self.events = None;
    }
}
