use super::fallback::FallbackSimulation;
use super::world::{lock, SharedWorld};
use super::{ConnectionStats, Netplay};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::protocol::{self, ClientMessage};
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const LINK_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnected(Retry),
    /// Terminal. The local simulation is feeding the roster.
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    Scheduled { attempt: u32, delay: Duration },
    /// Auto-reconnect is off; only [`ConnectionManager::reconnect`] leaves this state.
    Manual,
}

/// What the driver does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Connect,
    Wait(Duration),
    AwaitManual,
    Degrade,
    Stop,
}

/// Connection lifecycle without any I/O, so the backoff schedule can be
/// exercised directly.
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    attempts: u32,
    max_attempts: u32,
    base_delay: Duration,
    auto_reconnect: bool,
}

impl ConnectionMachine {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            state: ConnectionState::Idle,
            attempts: 0,
            max_attempts: config.max_reconnect_attempts,
            base_delay: config.reconnect_delay,
            auto_reconnect: config.auto_reconnect,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn start(&mut self, local_mode: bool) -> Step {
        if self.state != ConnectionState::Idle {
            return Step::Stop;
        }
        if local_mode {
            self.state = ConnectionState::Degraded;
            return Step::Degrade;
        }
        self.state = ConnectionState::Connecting;
        Step::Connect
    }

    pub fn opened(&mut self) {
        self.state = ConnectionState::Connected;
        self.attempts = 0;
    }

    /// Close, error or failed attempt. Delay grows linearly with the attempt
    /// number until the ceiling is hit, then the machine degrades for good.
    pub fn lost(&mut self) -> Step {
        if self.state == ConnectionState::Degraded {
            return Step::Stop;
        }
        if !self.auto_reconnect {
            self.state = ConnectionState::Disconnected(Retry::Manual);
            return Step::AwaitManual;
        }
        if self.attempts >= self.max_attempts {
            self.state = ConnectionState::Degraded;
            return Step::Degrade;
        }
        self.attempts += 1;
        let delay = self.base_delay * self.attempts;
        self.state = ConnectionState::Disconnected(Retry::Scheduled {
            attempt: self.attempts,
            delay,
        });
        Step::Wait(delay)
    }

    pub fn retry_due(&mut self) -> Step {
        match self.state {
            ConnectionState::Disconnected(Retry::Scheduled { .. }) => {
                self.state = ConnectionState::Connecting;
                Step::Connect
            }
            _ => Step::Stop,
        }
    }

    pub fn manual_retry(&mut self) -> Step {
        match self.state {
            ConnectionState::Disconnected(Retry::Manual) => {
                self.state = ConnectionState::Connecting;
                Step::Connect
            }
            _ => Step::Stop,
        }
    }
}

/// An open duplex text channel to the server. Dropping `outbound` closes it;
/// `inbound` yields `None` once the server side is gone.
#[derive(Debug)]
pub struct Link {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<String>,
}

pub trait Connector: Send + Sync + 'static {
    fn connect(&self, endpoint: &str) -> impl Future<Output = Result<Link, ClientError>> + Send;
}

/// WebSocket transport. Each link is pumped by two tasks that end with the socket.
#[derive(Debug, Clone)]
pub struct WsConnector {
    timeout: Duration,
}

impl WsConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Connector for WsConnector {
    fn connect(&self, endpoint: &str) -> impl Future<Output = Result<Link, ClientError>> + Send {
        let endpoint = endpoint.to_string();
        let timeout = self.timeout;
        async move {
            let (stream, _) = tokio::time::timeout(timeout, connect_async(endpoint.as_str()))
                .await
                .map_err(|_| ClientError::ConnectTimeout(timeout))??;
            let (mut sink, mut source) = stream.split();
            let (outbound, mut outbound_rx) = mpsc::channel::<String>(LINK_CAPACITY);
            let (inbound_tx, inbound) = mpsc::channel::<String>(LINK_CAPACITY);

            tokio::spawn(async move {
                while let Some(text) = outbound_rx.recv().await {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                let _ = sink.close().await;
            });

            tokio::spawn(async move {
                while let Some(frame) = source.next().await {
                    match frame {
                        Ok(Message::Text(text)) => {
                            if inbound_tx.send(text).await.is_err() {
                                break;
                            }
                        }
                        Ok(Message::Close(_)) => break,
                        Ok(_) => {}
                        Err(error) => {
                            tracing::debug!(%error, "socket read failed");
                            break;
                        }
                    }
                }
            });

            Ok(Link { outbound, inbound })
        }
    }
}

struct Shared {
    config: ClientConfig,
    machine: Mutex<ConnectionMachine>,
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    world: SharedWorld,
    hidden: watch::Sender<bool>,
    manual: Notify,
    fallback: Mutex<Option<FallbackSimulation>>,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Live-connection feed. Owns the connect/backoff/degrade cycle and the
/// periodic state push; all of its tasks stop when it is dropped.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    tasks: Vec<JoinHandle<()>>,
}

impl ConnectionManager {
    pub fn spawn<C: Connector>(config: ClientConfig, world: SharedWorld, connector: C) -> Self {
        let (hidden, hidden_rx) = watch::channel(false);
        let shared = Arc::new(Shared {
            machine: Mutex::new(ConnectionMachine::new(&config)),
            config,
            outbound: Mutex::new(None),
            world,
            hidden,
            manual: Notify::new(),
            fallback: Mutex::new(None),
        });
        let driver = tokio::spawn(drive(Arc::clone(&shared), connector));
        let sender = tokio::spawn(run_sender(Arc::clone(&shared), hidden_rx));
        Self {
            shared,
            tasks: vec![driver, sender],
        }
    }

    /// Leaves `Disconnected(Manual)`. No effect in any other state.
    pub fn reconnect(&self) {
        self.shared.manual.notify_one();
    }
}

impl Netplay for ConnectionManager {
    fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    fn send(&self, message: ClientMessage) -> bool {
        self.shared.send(message)
    }

    fn set_hidden(&self, hidden: bool) {
        self.shared.hidden.send_replace(hidden);
    }

    fn stats(&self) -> ConnectionStats {
        let machine = guard(&self.shared.machine).clone();
        let synthetic_players = guard(&self.shared.fallback)
            .as_ref()
            .map(FallbackSimulation::roster_size)
            .unwrap_or(0);
        ConnectionStats {
            state: machine.state(),
            reconnect_attempts: machine.attempts(),
            synthetic_players,
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        guard(&self.shared.fallback).take();
    }
}

impl Shared {
    fn state(&self) -> ConnectionState {
        guard(&self.machine).state()
    }

    fn start(&self) -> Step {
        guard(&self.machine).start(self.config.local_mode)
    }

    fn on_lost(&self) -> Step {
        *guard(&self.outbound) = None;
        let step = guard(&self.machine).lost();
        match step {
            Step::Wait(delay) => {
                tracing::info!(
                    attempt = guard(&self.machine).attempts(),
                    max = self.config.max_reconnect_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "reconnect scheduled"
                );
            }
            Step::AwaitManual => tracing::info!("auto-reconnect disabled"),
            _ => {}
        }
        step
    }

    fn on_retry_due(&self) -> Step {
        guard(&self.machine).retry_due()
    }

    fn on_manual_retry(&self) -> Step {
        guard(&self.machine).manual_retry()
    }

    fn on_open(&self, outbound: mpsc::Sender<String>) {
        guard(&self.machine).opened();
        *guard(&self.outbound) = Some(outbound);
        tracing::info!(url = %self.config.server_url, "connected to server");
        let local = lock(&self.world).local.clone();
        self.send(ClientMessage::Update(local));
    }

    fn receive(&self, text: &str) {
        match protocol::decode_server_message(text) {
            Ok(message) => {
                let now = Instant::now();
                let mut world = lock(&self.world);
                world.apply_server_message(message, now);
                world.expire_powerups(now);
            }
            Err(error) => tracing::warn!(%error, "discarding malformed server message"),
        }
    }

    /// Dropped silently unless connected.
    fn send(&self, message: ClientMessage) -> bool {
        if self.state() != ConnectionState::Connected {
            return false;
        }
        let Some(outbound) = guard(&self.outbound).clone() else { return false };
        match protocol::encode(&message) {
            Ok(payload) => outbound.try_send(payload).is_ok(),
            Err(error) => {
                tracing::warn!(%error, "failed to encode client message");
                false
            }
        }
    }

    fn push_local_state(&self) {
        if self.state() != ConnectionState::Connected {
            return;
        }
        let update = {
            let world = lock(&self.world);
            if !world.is_active() {
                return;
            }
            world.local.clone()
        };
        self.send(ClientMessage::Update(update));
    }

    fn degrade(&self) {
        let mut fallback = guard(&self.fallback);
        if fallback.is_some() {
            return;
        }
        if self.config.local_mode {
            tracing::info!("local mode selected, skipping network");
        } else {
            tracing::warn!("reconnect attempts exhausted, switching to local simulation");
        }
        lock(&self.world).clear_remote();
        *fallback = Some(FallbackSimulation::activate(
            self.config.fallback.clone(),
            Arc::clone(&self.world),
        ));
    }

    async fn run_link(&self, link: Link) {
        let Link {
            outbound,
            mut inbound,
        } = link;
        self.on_open(outbound);
        while let Some(text) = inbound.recv().await {
            self.receive(&text);
        }
        tracing::info!("disconnected from server");
    }
}

async fn drive<C: Connector>(shared: Arc<Shared>, connector: C) {
    let mut step = shared.start();
    loop {
        step = match step {
            Step::Connect => {
                tracing::debug!(url = %shared.config.server_url, "connecting");
                match connector.connect(&shared.config.server_url).await {
                    Ok(link) => shared.run_link(link).await,
                    Err(error) => tracing::warn!(%error, "connection failed"),
                }
                shared.on_lost()
            }
            Step::Wait(delay) => {
                tokio::time::sleep(delay).await;
                shared.on_retry_due()
            }
            Step::AwaitManual => {
                shared.manual.notified().await;
                shared.on_manual_retry()
            }
            Step::Degrade => {
                shared.degrade();
                break;
            }
            Step::Stop => break,
        };
    }
}

async fn run_sender(shared: Arc<Shared>, mut hidden: watch::Receiver<bool>) {
    loop {
        let period = if *hidden.borrow() {
            shared.config.hidden_update_interval
        } else {
            shared.config.update_interval
        };
        tokio::select! {
            _ = tokio::time::sleep(period) => shared.push_local_state(),
            changed = hidden.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fallback::is_synthetic_id;
    use crate::client::world::{shared, ClientWorld};
    use crate::game::types::{PlayerUpdate, Point};
    use crate::protocol::ServerMessage;
    use std::collections::VecDeque;
    use tokio::time::Instant as TokioInstant;

    fn config() -> ClientConfig {
        ClientConfig::default()
    }

    fn world() -> SharedWorld {
        shared(ClientWorld::new(PlayerUpdate {
            x: 40.0,
            y: 40.0,
            segments: vec![Point { x: 40.0, y: 40.0 }, Point { x: 20.0, y: 40.0 }],
            score: 0,
            size: 20,
            powerups: Vec::new(),
            direction: None,
        }))
    }

    struct ServerEnd {
        from_client: mpsc::Receiver<String>,
        to_client: mpsc::Sender<String>,
    }

    fn link_pair() -> (Link, ServerEnd) {
        let (outbound, from_client) = mpsc::channel(256);
        let (to_client, inbound) = mpsc::channel(256);
        (
            Link { outbound, inbound },
            ServerEnd {
                from_client,
                to_client,
            },
        )
    }

    #[derive(Clone, Default)]
    struct ScriptedConnector {
        attempts: Arc<Mutex<Vec<TokioInstant>>>,
        links: Arc<Mutex<VecDeque<Link>>>,
    }

    impl Connector for ScriptedConnector {
        fn connect(&self, _endpoint: &str) -> impl Future<Output = Result<Link, ClientError>> + Send {
            guard(&self.attempts).push(TokioInstant::now());
            let next = guard(&self.links).pop_front();
            async move { next.ok_or(ClientError::ConnectTimeout(Duration::from_secs(5))) }
        }
    }

    fn drain_updates(server: &mut ServerEnd) -> usize {
        let mut count = 0;
        while let Ok(text) = server.from_client.try_recv() {
            if text.contains("\"type\":\"update\"") {
                count += 1;
            }
        }
        count
    }

    #[test]
    fn backoff_grows_linearly_then_degrades_once() {
        let mut machine = ConnectionMachine::new(&config());
        assert_eq!(machine.start(false), Step::Connect);

        let mut delays = Vec::new();
        loop {
            match machine.lost() {
                Step::Wait(delay) => {
                    delays.push(delay);
                    assert_eq!(machine.retry_due(), Step::Connect);
                }
                Step::Degrade => break,
                other => panic!("unexpected step {other:?}"),
            }
        }

        let expected: Vec<Duration> = (1..=5).map(|n| Duration::from_millis(1000 * n)).collect();
        assert_eq!(delays, expected);
        assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(machine.state(), ConnectionState::Degraded);
        assert_eq!(machine.lost(), Step::Stop);
        assert_eq!(machine.retry_due(), Step::Stop);
        assert_eq!(machine.manual_retry(), Step::Stop);
        assert_eq!(machine.state(), ConnectionState::Degraded);
    }

    #[test]
    fn successful_open_resets_attempts() {
        let mut machine = ConnectionMachine::new(&config());
        machine.start(false);
        machine.lost();
        machine.lost();
        assert_eq!(machine.attempts(), 2);
        machine.retry_due();
        machine.opened();
        assert_eq!(machine.attempts(), 0);
        assert_eq!(
            machine.lost(),
            Step::Wait(Duration::from_millis(1000))
        );
    }

    #[test]
    fn disabled_auto_reconnect_waits_for_manual_action() {
        let mut cfg = config();
        cfg.auto_reconnect = false;
        let mut machine = ConnectionMachine::new(&cfg);
        machine.start(false);
        assert_eq!(machine.lost(), Step::AwaitManual);
        assert_eq!(machine.state(), ConnectionState::Disconnected(Retry::Manual));
        assert_eq!(machine.retry_due(), Step::Stop);
        assert_eq!(machine.manual_retry(), Step::Connect);
        assert_eq!(machine.state(), ConnectionState::Connecting);
    }

    #[test]
    fn local_mode_skips_networking() {
        let mut machine = ConnectionMachine::new(&config());
        assert_eq!(machine.start(true), Step::Degrade);
        assert_eq!(machine.state(), ConnectionState::Degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_reconnects_degrade_to_three_synthetic_players() {
        let connector = ScriptedConnector::default();
        let attempts = Arc::clone(&connector.attempts);
        let world = world();
        let started = TokioInstant::now();
        let manager = ConnectionManager::spawn(config(), world.clone(), connector);

        tokio::time::sleep(Duration::from_secs(60)).await;

        let offsets: Vec<u64> = guard(&attempts)
            .iter()
            .map(|at| at.duration_since(started).as_millis() as u64)
            .collect();
        let expected = [0, 1000, 3000, 6000, 10000, 15000];
        assert_eq!(offsets.len(), expected.len(), "attempts at {offsets:?}");
        for (actual, wanted) in offsets.iter().zip(expected) {
            assert!((wanted..wanted + 10).contains(actual), "attempts at {offsets:?}");
        }
        assert_eq!(manager.state(), ConnectionState::Degraded);
        assert_eq!(manager.stats().synthetic_players, 3);

        let roster_ids: Vec<String> = lock(&world).roster().players().map(|p| p.id.clone()).collect();
        assert_eq!(roster_ids.len(), 3);
        assert!(roster_ids.iter().all(|id| is_synthetic_id(id)));
        assert!(!manager.send(ClientMessage::Death));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(guard(&attempts).len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn open_link_pushes_state_and_reconciles_server_frames() {
        let connector = ScriptedConnector::default();
        let (link, mut server) = link_pair();
        guard(&connector.links).push_back(link);
        let world = world();
        let manager = ConnectionManager::spawn(config(), world.clone(), connector.clone());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(manager.state(), ConnectionState::Connected);
        let first = server.from_client.try_recv().expect("initial state push");
        assert!(first.contains("\"type\":\"update\""));

        let mut me = crate::game::store::new_player("me", &mut rand::thread_rng());
        me.score = 99;
        let other = crate::game::store::new_player("other", &mut rand::thread_rng());
        let init = protocol::encode(&ServerMessage::Init {
            player_id: "me".to_string(),
            players: vec![me.clone(), other],
            food: Vec::new(),
            powerups: Vec::new(),
        })
        .expect("encode");
        server.to_client.send(init).await.expect("deliver");
        server.to_client.send("{garbage".to_string()).await.expect("deliver");
        let echo = protocol::encode(&ServerMessage::PlayerUpdate {
            player_id: "me".to_string(),
            player: me,
        })
        .expect("encode");
        server.to_client.send(echo).await.expect("deliver");
        tokio::time::sleep(Duration::from_millis(10)).await;

        {
            let world = lock(&world);
            assert_eq!(world.roster().local_id(), Some("me"));
            assert_eq!(world.roster().len(), 1);
            assert!(world.roster().get("other").is_some());
        }

        // Not running yet: the periodic sender stays quiet.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(drain_updates(&mut server), 0);

        lock(&world).running = true;
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let visible = drain_updates(&mut server);
        assert!(visible >= 15, "expected ~20 pushes, got {visible}");

        manager.set_hidden(true);
        tokio::time::sleep(Duration::from_millis(3000)).await;
        let hidden = drain_updates(&mut server);
        assert!((2..=4).contains(&hidden), "expected ~3 pushes, got {hidden}");

        manager.set_hidden(false);
        lock(&world).paused = true;
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(drain_updates(&mut server), 0);

        assert!(manager.send(ClientMessage::Chat {
            message: "hi".to_string()
        }));

        drop(server);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(matches!(
            manager.state(),
            ConnectionState::Disconnected(Retry::Scheduled { attempt: 1, .. })
        ));
        assert!(!manager.send(ClientMessage::Death));
        assert_eq!(guard(&connector.attempts).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_reconnect_after_drop_when_auto_disabled() {
        let mut cfg = config();
        cfg.auto_reconnect = false;
        let connector = ScriptedConnector::default();
        let attempts = Arc::clone(&connector.attempts);
        let manager = ConnectionManager::spawn(cfg, world(), connector);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(guard(&attempts).len(), 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected(Retry::Manual));

        manager.reconnect();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(guard(&attempts).len(), 2);
        assert_eq!(manager.state(), ConnectionState::Disconnected(Retry::Manual));
    }
}
