//! Connection handling for `/agent` (live Decision Loop) and `/automation`
//! (Replay Engine): a split sink/stream forwarding loop, `tokio::select!`
//! over inbound frames and outbound events, driving an authenticate ->
//! heartbeat -> dispatch -> cleanup lifecycle per connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tracing::{info, warn};
use webpilot_agent::tools::ToolRegistry;
use webpilot_orchestrator::{DecisionLoop, ReplayEngine};
use webpilot_types::{AgentEvent, EventSink, RunStatus};

use crate::control::{ClientMessage, HandshakeMessage};
use crate::error::Result;
use crate::session::{launch_browser, AppState, SessionHandle};

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Agent,
    Automation,
}

pub async fn agent_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state, Endpoint::Agent))
}

pub async fn automation_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state, Endpoint::Automation))
}

/// Sink that serializes every `AgentEvent` onto the shared WebSocket
/// sender. Shared (via the same mutex) with the heartbeat pinger and the
/// screenshot pump so frames never interleave mid-write.
struct WsSink(Arc<Mutex<futures::stream::SplitSink<WebSocket, Message>>>);

#[async_trait::async_trait]
impl EventSink for WsSink {
    async fn emit(&self, event: AgentEvent) -> webpilot_types::Result<()> {
        let text = serde_json::to_string(&event)?;
        let mut sender = self.0.lock().await;
        let _ = sender.send(Message::Text(text.into())).await;
        Ok(())
    }
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>, endpoint: Endpoint) {
    let (sink_half, mut stream_half) = socket.split();
    let sender = Arc::new(Mutex::new(sink_half));

    let Some(session) = authenticate(&mut stream_half, &sender, &state).await else {
        return;
    };
    state.sessions.insert(session.session_id, session.clone());
    info!(session_id = %session.session_id, "session authenticated");

    let heartbeat_interval = state.config.heartbeat_interval;
    let ponged_since_last_tick = Arc::new(AtomicBool::new(true));
    let mut heartbeat = tokio::time::interval(heartbeat_interval);
    heartbeat.tick().await; // first tick fires immediately; consume it

    let mut agent_task: Option<tokio::task::JoinHandle<()>> = None;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if !ponged_since_last_tick.swap(false, Ordering::SeqCst) {
                    warn!(session_id = %session.session_id, "heartbeat timeout, closing");
                    break;
                }
                let mut sender = sender.lock().await;
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            msg = stream_half.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        ponged_since_last_tick.store(true, Ordering::SeqCst);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(session_id = %session.session_id, "connection closed");
                        break;
                    }
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Heartbeat { .. }) => {
                                ponged_since_last_tick.store(true, Ordering::SeqCst);
                            }
                            Ok(start @ (ClientMessage::StartAgent { .. } | ClientMessage::StartScript { .. })) => {
                                if !session.try_start_agent() {
                                    let sink = WsSink(sender.clone());
                                    let _ = sink.emit(AgentEvent::Error {
                                        error: "an agent is already running on this session".into(),
                                    }).await;
                                    continue;
                                }
                                agent_task = Some(spawn_agent(start, endpoint, state.clone(), session.clone(), sender.clone()));
                            }
                            Ok(ClientMessage::Authenticate { .. }) => {
                                warn!(session_id = %session.session_id, "duplicate authenticate message ignored");
                            }
                            Err(e) => {
                                warn!(session_id = %session.session_id, %e, "malformed control message");
                            }
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(session_id = %session.session_id, %e, "websocket error");
                        break;
                    }
                }
            }
        }
    }

    if let Some(task) = agent_task {
        task.abort();
    }
    state.sessions.remove(&session.session_id);
    info!(session_id = %session.session_id, "session cleaned up");
}

async fn authenticate(
    stream: &mut futures::stream::SplitStream<WebSocket>,
    sender: &Arc<Mutex<futures::stream::SplitSink<WebSocket, Message>>>,
    state: &Arc<AppState>,
) -> Option<Arc<SessionHandle>> {
    let first = stream.next().await?;
    let Ok(Message::Text(text)) = first else {
        return None;
    };
    let Ok(ClientMessage::Authenticate { token }) = serde_json::from_str::<ClientMessage>(&text) else {
        send_handshake(sender, HandshakeMessage::failed("first message must be authenticate")).await;
        return None;
    };

    match state.auth.verify(&token).await {
        Ok(user_id) => {
            send_handshake(sender, HandshakeMessage::success()).await;
            Some(SessionHandle::new(user_id))
        }
        Err(e) => {
            send_handshake(sender, HandshakeMessage::failed(e.to_string())).await;
            None
        }
    }
}

async fn send_handshake(
    sender: &Arc<Mutex<futures::stream::SplitSink<WebSocket, Message>>>,
    message: HandshakeMessage,
) {
    if let Ok(text) = serde_json::to_string(&message) {
        let _ = sender.lock().await.send(Message::Text(text.into())).await;
    }
}

fn spawn_agent(
    start: ClientMessage,
    endpoint: Endpoint,
    state: Arc<AppState>,
    session: Arc<SessionHandle>,
    sender: Arc<Mutex<futures::stream::SplitSink<WebSocket, Message>>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let sink: Arc<dyn EventSink> = Arc::new(WsSink(sender));
        let store = state.store_factory.for_user(session.user_id);
        let tools = Arc::new(ToolRegistry::new(state.model.clone()));

        let result = match (endpoint, start) {
            (Endpoint::Agent, ClientMessage::StartAgent { run_id }) => {
                run_live(run_id, state.model.clone(), tools, store, sink.clone(), session.clone(), state.config).await
            }
            (Endpoint::Automation, ClientMessage::StartScript { automation_id }) => {
                run_replay(automation_id, state.model.clone(), tools, store, sink.clone(), state.config).await
            }
            _ => {
                let _ = sink
                    .emit(AgentEvent::Error {
                        error: "message type not valid on this endpoint".into(),
                    })
                    .await;
                return;
            }
        };

        if let Err(e) = result {
            warn!(session_id = %session.session_id, %e, "agent task ended with error");
            let _ = sink.emit(AgentEvent::Error { error: e.to_string() }).await;
        }
    })
}

async fn run_live(
    run_id: webpilot_types::RunId,
    model: Arc<dyn webpilot_types::ModelClient>,
    tools: Arc<ToolRegistry>,
    store: Arc<dyn webpilot_types::StoreAdapter>,
    sink: Arc<dyn EventSink>,
    session: Arc<SessionHandle>,
    config: crate::session::SupervisorConfig,
) -> Result<()> {
    let mut run = store.fetch_run(run_id).await?;

    if run.status.is_terminal() {
        for step in run.steps.clone() {
            sink.emit(AgentEvent::StepUpdate { step }).await?;
        }
        sink.emit(AgentEvent::Completion {
            status: run.status,
            final_answer: run.final_answer.clone(),
        })
        .await?;
        return Ok(());
    }

    let (browser, page) = launch_browser(true).await?;
    let page = Arc::new(Mutex::new(page));

    let pump_page = page.clone();
    let pump_tx = session.latest_screenshot.clone();
    let pump = tokio::spawn(async move {
        let mut interval = tokio::time::interval(config.live_pump_interval);
        loop {
            interval.tick().await;
            if let Ok(guard) = pump_page.try_lock() {
                if let Ok(shot) = guard.screenshot().await {
                    let _ = pump_tx.send(Some(shot));
                }
            }
        }
    });

    // Forwards the pump's latest-value-wins watch channel to the client as
    // `screenshot_update` events. A `watch` receiver only ever observes the
    // newest value since it last looked, so a slow client naturally
    // coalesces frames instead of queueing them.
    let mut screenshot_rx = session.latest_screenshot.subscribe();
    let forward_sink = sink.clone();
    let forwarder = tokio::spawn(async move {
        while screenshot_rx.changed().await.is_ok() {
            let shot = screenshot_rx.borrow_and_update().clone();
            if let Some(shot) = shot {
                let _ = forward_sink
                    .emit(AgentEvent::ScreenshotUpdate { context: run_id.into(), screenshot: shot })
                    .await;
            }
        }
    });

    let loop_runner = DecisionLoop::with_max_iterations(model, tools, sink, config.max_iterations);
    let outcome = loop_runner.run(&mut run, &page, &*store).await;

    pump.abort();
    forwarder.abort();
    let _ = browser.close().await;
    outcome.map_err(Into::into)
}

async fn run_replay(
    automation_id: webpilot_types::AutomationId,
    model: Arc<dyn webpilot_types::ModelClient>,
    tools: Arc<ToolRegistry>,
    store: Arc<dyn webpilot_types::StoreAdapter>,
    sink: Arc<dyn EventSink>,
    config: crate::session::SupervisorConfig,
) -> Result<()> {
    let automation = store.fetch_automation(automation_id).await?;

    let (browser, page) = launch_browser(true).await?;
    let page = Arc::new(Mutex::new(page));

    let pump_page = page.clone();
    let pump_sink = sink.clone();
    let pump = tokio::spawn(async move {
        let mut interval = tokio::time::interval(config.replay_pump_interval);
        loop {
            interval.tick().await;
            if let Ok(guard) = pump_page.try_lock() {
                if let Ok(shot) = guard.screenshot().await {
                    let _ = pump_sink
                        .emit(AgentEvent::ScreenshotUpdate {
                            context: automation_id.into(),
                            screenshot: shot,
                        })
                        .await;
                }
            }
        }
    });

    let engine = ReplayEngine::new(tools, Some(model), sink.clone());
    let outcome = engine.run(&automation, &page).await;

    pump.abort();
    let _ = browser.close().await;

    match outcome {
        Ok(message) => {
            sink.emit(AgentEvent::Completion {
                status: RunStatus::Completed,
                final_answer: Some(message),
            })
            .await?;
            Ok(())
        }
        Err(e) => {
            sink.emit(AgentEvent::Completion {
                status: RunStatus::Failed,
                final_answer: Some(e.to_string()),
            })
            .await?;
            Err(e.into())
        }
    }
}
