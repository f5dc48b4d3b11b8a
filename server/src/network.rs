//! Host network layer: TCP accept loop, per-session reader/writer tasks and
//! the fixed-rate simulation loop.

use crate::broadcast::Broadcaster;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::game::{Elimination, World};
use crate::input::InputQueue;
use crate::session::{Frame, SessionRegistry};
use log::{debug, error, info, warn};
use shared::{FrameDecoder, Message, PlayerId, ProtocolError, TransportError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{interval, sleep, timeout, Instant, MissedTickBehavior};

const READ_BUFFER_SIZE: usize = 1024;
const LOBBY_POLL: Duration = Duration::from_millis(50);

/// State shared by every task of one host.
struct HostContext {
    config: ServerConfig,
    registry: Arc<SessionRegistry>,
    inputs: InputQueue,
}

/// Why a session's reader stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadEnd {
    /// Peer closed the stream
    Closed,
    /// Peer sent `quit`
    Quit,
    /// Host is shutting down
    Shutdown,
}

/// How the simulation loop finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundSummary {
    pub ticks: u64,
    pub players: Vec<PlayerId>,
    pub eliminated: Vec<(PlayerId, Elimination)>,
    /// False when shutdown interrupted the lobby or the round
    pub completed: bool,
}

/// Cooperative shutdown trigger for a running [`Server`].
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Authoritative host
pub struct Server {
    listener: TcpListener,
    ctx: Arc<HostContext>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl Server {
    /// Validates the configuration and binds the listener. Both failures
    /// are fatal.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let listener = TcpListener::bind(&config.listen_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.listen_addr.clone(),
                source,
            })?;
        info!("Server listening on {}", listener.local_addr()?);

        let registry = Arc::new(SessionRegistry::new(
            config.max_connections_per_origin,
            config.max_players,
        ));
        let inputs = InputQueue::new(config.input_capacity);
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Server {
            listener,
            ctx: Arc::new(HostContext {
                config,
                registry,
                inputs,
            }),
            shutdown_tx: Arc::new(shutdown_tx),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.ctx.registry)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Runs the lobby and one round, then shuts the host down. Sessions get
    /// to flush what is already queued before their tasks end.
    pub async fn run(self) -> Result<RoundSummary, ServerError> {
        let Server {
            listener,
            ctx,
            shutdown_tx,
        } = self;

        let acceptor = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&ctx),
            shutdown_tx.subscribe(),
        ));

        let summary = run_game_loop(&ctx, shutdown_tx.subscribe()).await;

        shutdown_tx.send_replace(true);
        if let Err(e) = acceptor.await {
            error!("Accept loop task failed: {}", e);
        }
        info!("Server stopped after {} ticks", summary.ticks);

        Ok(summary)
    }
}

async fn accept_loop(
    listener: TcpListener,
    ctx: Arc<HostContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    sessions.spawn(run_session(stream, addr, Arc::clone(&ctx), shutdown.clone()));
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    sleep(Duration::from_millis(10)).await;
                }
            },
            Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = finished {
                    error!("Session task failed: {}", e);
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    debug!("Accept loop stopped, waiting for {} sessions", sessions.len());
    while sessions.join_next().await.is_some() {}
}

/// Supervises one connection from admission to cleanup. The registry entry
/// is released by the session guard however the task ends.
async fn run_session(
    stream: TcpStream,
    addr: SocketAddr,
    ctx: Arc<HostContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (outbound_tx, outbound_rx) = mpsc::channel::<Frame>(ctx.config.outbound_capacity);
    let guard = match ctx.registry.admit_guarded(addr, outbound_tx) {
        Ok(guard) => guard,
        Err(e) => {
            warn!("Rejected connection from {}: {}", addr, e);
            return;
        }
    };
    let player = guard.id();

    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not disable Nagle for {}: {}", addr, e);
    }
    let (reader, writer) = stream.into_split();
    let write_timeout = ctx.config.write_timeout;
    let mut writer_task = tokio::spawn(write_frames(writer, outbound_rx, write_timeout));
    let mut writer_done = false;

    let end = tokio::select! {
        result = read_frames(reader, player, &ctx.inputs) => result,
        result = &mut writer_task => {
            writer_done = true;
            match result {
                Ok(Ok(())) => Ok(ReadEnd::Closed),
                Ok(Err(e)) => Err(e),
                Err(e) => {
                    error!("Writer task for player {} failed: {}", player, e);
                    Ok(ReadEnd::Closed)
                }
            }
        }
        _ = shutdown.changed() => Ok(ReadEnd::Shutdown),
    };

    match end {
        Ok(reason) => info!("Player {} session ended: {:?}", player, reason),
        Err(e) => warn!("Player {} session ended: {}", player, e),
    }

    // Closing the registry entry closes the outbound queue; the writer then
    // flushes what is left and exits.
    drop(guard);
    if !writer_done {
        match timeout(write_timeout * 2, writer_task).await {
            Ok(Ok(Err(e))) => debug!("Final writes to player {} failed: {}", player, e),
            Ok(_) => {}
            Err(_) => debug!("Gave up flushing player {}", player),
        }
    }
}

/// Decodes client frames and feeds direction requests into the input queue.
/// Bad frames are logged and skipped; only the transport ends the loop.
pub async fn read_frames<R>(
    mut reader: R,
    player: PlayerId,
    inputs: &InputQueue,
) -> Result<ReadEnd, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut decoder = FrameDecoder::new();
    let mut buffer = [0u8; READ_BUFFER_SIZE];

    loop {
        let len = reader.read(&mut buffer).await?;
        if len == 0 {
            return Ok(ReadEnd::Closed);
        }

        for result in decoder.push(&buffer[..len]) {
            match result {
                Ok(Message::Direction { direction }) => {
                    debug!("Player {} requested {:?}", player, direction);
                    inputs.push(player, direction);
                }
                Ok(Message::Quit) => return Ok(ReadEnd::Quit),
                Ok(other) => warn!(
                    "Player {}: {}",
                    player,
                    ProtocolError::Unexpected(other.kind())
                ),
                Err(e) => warn!("Player {} sent a bad frame: {}", player, e),
            }
        }
    }
}

/// Writes queued frames until the queue closes. Each write must finish
/// within `write_timeout`.
pub async fn write_frames<W>(
    mut writer: W,
    mut outbound: mpsc::Receiver<Frame>,
    write_timeout: Duration,
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = outbound.recv().await {
        match timeout(write_timeout, writer.write_all(&frame)).await {
            Ok(result) => result?,
            Err(_) => return Err(TransportError::Timeout(write_timeout)),
        }
    }

    let _ = writer.shutdown().await;
    Ok(())
}

/// Waits in the lobby until enough players are in, then for the lobby
/// countdown. Returns the roster, or `None` on shutdown.
async fn wait_for_players(
    ctx: &HostContext,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<Vec<PlayerId>> {
    let min_players = ctx.config.min_players;
    let mut ready_since: Option<Instant> = None;
    let mut poll = interval(LOBBY_POLL);

    info!("Waiting for {} player(s)", min_players);
    loop {
        tokio::select! {
            _ = poll.tick() => {}
            _ = shutdown.changed() => return None,
        }

        if ctx.registry.len() < min_players {
            if ready_since.take().is_some() {
                info!("Lobby dropped below {} player(s)", min_players);
            }
            continue;
        }

        let since = *ready_since.get_or_insert_with(|| {
            info!("Round starts in {:?}", ctx.config.lobby_wait);
            Instant::now()
        });
        if since.elapsed() >= ctx.config.lobby_wait {
            return Some(ctx.registry.ids());
        }
    }
}

/// Lobby, round start and the fixed-rate tick. Only this task touches the
/// world.
async fn run_game_loop(ctx: &HostContext, mut shutdown: watch::Receiver<bool>) -> RoundSummary {
    let mut summary = RoundSummary {
        ticks: 0,
        players: Vec::new(),
        eliminated: Vec::new(),
        completed: false,
    };

    let Some(roster) = wait_for_players(ctx, &mut shutdown).await else {
        return summary;
    };

    // Lobby input has no snake to steer.
    ctx.inputs.drain_all();

    let broadcaster = Broadcaster::new(Arc::clone(&ctx.registry), ctx.config.max_send_failures);
    let mut world = World::new(ctx.config.grid, ctx.config.spawn_seed);

    for player in roster {
        let state = match world.spawn(player) {
            Ok(state) => state,
            Err(e) => {
                warn!("Player {} cannot join the round: {}", player, e);
                continue;
            }
        };
        let start = Message::Start {
            player_id: player,
            coords: state.coords,
            color: state.color,
        };
        if let Err(e) = broadcaster.send_to(player, &start) {
            error!("Failed to encode start message: {}", e);
        }
        summary.players.push(player);
    }
    info!("Round started with {} snake(s)", summary.players.len());

    let mut ticker = interval(ctx.config.tick_duration());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                info!("Round interrupted on tick {}", world.tick());
                return summary;
            }
        }

        let events = ctx.inputs.drain_all();
        let outcome = world.step(&events);
        summary.ticks = outcome.snapshot.tick;
        summary.eliminated.extend(outcome.eliminated);

        match broadcaster.publish(outcome.snapshot) {
            Ok(report) if !report.dropped.is_empty() => {
                info!("Dropped sessions {:?} on tick {}", report.dropped, summary.ticks);
            }
            Ok(_) => {}
            Err(e) => error!("Failed to encode tick {}: {}", summary.ticks, e),
        }

        if summary.ticks % 50 == 0 {
            debug!(
                "Tick {}: {} sessions, {} snakes alive, {} inputs dropped",
                summary.ticks,
                ctx.registry.len(),
                world.alive_count(),
                ctx.inputs.dropped()
            );
        }

        if world.alive_count() == 0 {
            info!("Round over after {} ticks", summary.ticks);
            summary.completed = true;
            return summary;
        }
    }
}
