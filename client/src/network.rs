use crate::input::LocalInput;
use crate::mailbox::{Assignment, ConnectionStatus, SnapshotMailbox};
use crate::rendering::Renderer;
use log::{debug, error, info, warn};
use shared::{encode, Direction, FrameDecoder, FramingError, Message, ProtocolError, TransportError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{interval, MissedTickBehavior};

const READ_BUFFER_SIZE: usize = 4096;

/// Fastest render or send cadence accepted from the command line.
pub const MAX_RATE: u32 = 1000;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{name}` must be between 1 and {max} per second, got {rate}")]
    InvalidRate {
        name: &'static str,
        rate: u32,
        max: u32,
    },
    #[error("`{0}` must be longer than zero")]
    ZeroInterval(&'static str),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Framing(#[from] FramingError),
}

/// Reads host frames into `mailbox` until the connection ends.
///
/// Bad frames are logged and skipped. On return the mailbox is always
/// marked disconnected; a clean EOF gives `Ok(())`.
pub async fn run_receiver<R>(mut reader: R, mailbox: &SnapshotMailbox) -> Result<(), TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut decoder = FrameDecoder::new();
    let mut buffer = [0u8; READ_BUFFER_SIZE];

    loop {
        let len = match reader.read(&mut buffer).await {
            Ok(0) => {
                mailbox.mark_disconnected("host closed the connection");
                return Ok(());
            }
            Ok(len) => len,
            Err(e) => {
                let e = TransportError::from(e);
                mailbox.mark_disconnected(e.to_string());
                return Err(e);
            }
        };

        for result in decoder.push(&buffer[..len]) {
            match result {
                Ok(Message::Start {
                    player_id,
                    coords,
                    color,
                }) => {
                    info!("Assigned player {} with {} segments", player_id, coords.len());
                    mailbox.set_assignment(Assignment {
                        player_id,
                        coords,
                        color,
                    });
                }
                Ok(Message::BoardUpdate(snapshot)) => {
                    let tick = snapshot.tick;
                    if !mailbox.offer(snapshot) {
                        debug!("Ignoring stale board update for tick {}", tick);
                    }
                }
                Ok(other) => warn!("{}", ProtocolError::Unexpected(other.kind())),
                Err(e) => warn!("Host sent a bad frame: {}", e),
            }
        }
    }
}

/// Client half of the input channel.
pub struct InputSender<W> {
    writer: W,
}

impl<W> InputSender<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn send_direction(&mut self, direction: Direction) -> Result<(), ClientError> {
        self.send(&Message::Direction { direction }).await
    }

    /// Tells the host we are leaving and closes our write side.
    pub async fn quit(&mut self) -> Result<(), ClientError> {
        self.send(&Message::Quit).await?;
        self.writer
            .shutdown()
            .await
            .map_err(TransportError::from)?;
        Ok(())
    }

    async fn send(&mut self, message: &Message) -> Result<(), ClientError> {
        let frame = encode(message)?;
        self.writer
            .write_all(&frame)
            .await
            .map_err(TransportError::from)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClientSettings {
    pub render_interval: Duration,
    pub send_interval: Duration,
}

impl ClientSettings {
    /// Builds the cadences from per-second rates, rejecting zero and
    /// anything above [`MAX_RATE`].
    pub fn from_rates(render_fps: u32, send_rate: u32) -> Result<Self, ClientError> {
        Ok(Self {
            render_interval: interval_for("render_fps", render_fps)?,
            send_interval: interval_for("send_rate", send_rate)?,
        })
    }

    fn validate(&self) -> Result<(), ClientError> {
        if self.render_interval.is_zero() {
            return Err(ClientError::ZeroInterval("render_interval"));
        }
        if self.send_interval.is_zero() {
            return Err(ClientError::ZeroInterval("send_interval"));
        }
        Ok(())
    }
}

fn interval_for(name: &'static str, rate: u32) -> Result<Duration, ClientError> {
    if rate == 0 || rate > MAX_RATE {
        return Err(ClientError::InvalidRate {
            name,
            rate,
            max: MAX_RATE,
        });
    }
    Ok(Duration::from_nanos(1_000_000_000 / u64::from(rate)))
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            render_interval: Duration::from_secs_f64(1.0 / 60.0),
            send_interval: Duration::from_millis(100),
        }
    }
}

pub struct Client {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    mailbox: Arc<SnapshotMailbox>,
}

impl Client {
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        info!("Connecting to {}...", addr);
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Could not disable Nagle on the connection: {}", e);
        }

        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader,
            writer,
            mailbox: Arc::new(SnapshotMailbox::new()),
        })
    }

    pub fn mailbox(&self) -> Arc<SnapshotMailbox> {
        Arc::clone(&self.mailbox)
    }

    /// Drives the session until the host goes away or the player quits.
    ///
    /// Snapshots are rendered at `render_interval`, never more than once
    /// per tick. The latest local direction is sent at `send_interval`.
    pub async fn run<R>(
        self,
        renderer: &mut R,
        input: &LocalInput,
        settings: ClientSettings,
    ) -> Result<(), ClientError>
    where
        R: Renderer,
    {
        settings.validate()?;

        let Client {
            reader,
            writer,
            mailbox,
        } = self;

        let receiver_mailbox = Arc::clone(&mailbox);
        let receiver = tokio::spawn(async move {
            if let Err(e) = run_receiver(reader, &receiver_mailbox).await {
                error!("Receive failed: {}", e);
            }
        });

        let mut sender = InputSender::new(writer);
        let mut render_tick = interval(settings.render_interval);
        render_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut send_tick = interval(settings.send_interval);
        send_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut rendered: Option<u64> = None;

        let result = loop {
            tokio::select! {
                _ = render_tick.tick() => {
                    let status = mailbox.status();
                    if let Some(snapshot) = mailbox.newer_than(rendered) {
                        rendered = Some(snapshot.tick);
                        renderer.render(&snapshot, mailbox.player_id());
                    }
                    if let ConnectionStatus::Disconnected(reason) = status {
                        renderer.disconnected(&reason);
                        break Ok(());
                    }
                }
                _ = send_tick.tick() => {
                    if input.quit_requested() {
                        info!("Leaving the game");
                        break sender.quit().await;
                    }
                    if let Some(direction) = input.take_direction() {
                        if let Err(e) = sender.send_direction(direction).await {
                            mailbox.mark_disconnected(e.to_string());
                            renderer.disconnected(&e.to_string());
                            break Err(e);
                        }
                    }
                }
            }
        };

        receiver.abort();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Position, SnakeState, WorldSnapshot, GREEN};
    use std::io;
    use tokio::net::TcpListener;
    use tokio_test::io::Builder;

    fn board_update(tick: u64) -> Message {
        Message::BoardUpdate(WorldSnapshot {
            tick,
            snakes: vec![SnakeState {
                id: 1,
                coords: vec![Position::new(6, 5), Position::new(5, 5), Position::new(5, 6)],
                color: GREEN,
                direction: Direction::Right,
            }],
        })
    }

    fn frame(message: &Message) -> Vec<u8> {
        encode(message).unwrap()
    }

    #[derive(Default)]
    struct RecordingRenderer {
        ticks: Vec<u64>,
        me: Option<u32>,
        disconnect: Option<String>,
    }

    impl Renderer for RecordingRenderer {
        fn render(&mut self, snapshot: &WorldSnapshot, me: Option<u32>) {
            self.ticks.push(snapshot.tick);
            self.me = me;
        }

        fn disconnected(&mut self, reason: &str) {
            self.disconnect = Some(reason.to_string());
        }
    }

    #[tokio::test]
    async fn test_receiver_reassembles_split_frames() {
        let bytes = frame(&board_update(3));
        let (head, tail) = bytes.split_at(11);
        let reader = Builder::new().read(head).read(tail).build();

        let mailbox = SnapshotMailbox::new();
        run_receiver(reader, &mailbox).await.unwrap();

        assert_eq!(mailbox.latest().unwrap().tick, 3);
        assert_eq!(
            mailbox.status(),
            ConnectionStatus::Disconnected("host closed the connection".to_string())
        );
    }

    #[tokio::test]
    async fn test_receiver_skips_garbage_and_keeps_newest() {
        let mut bytes = frame(&board_update(5));
        bytes.extend_from_slice(b"{not json\n");
        bytes.extend_from_slice(&frame(&board_update(3)));
        bytes.extend_from_slice(&frame(&Message::Quit));
        let reader = Builder::new().read(&bytes).build();

        let mailbox = SnapshotMailbox::new();
        run_receiver(reader, &mailbox).await.unwrap();

        assert_eq!(mailbox.latest().unwrap().tick, 5);
    }

    #[tokio::test]
    async fn test_receiver_records_assignment() {
        let start = Message::Start {
            player_id: 4,
            coords: vec![Position::new(5, 40), Position::new(5, 41), Position::new(5, 42)],
            color: GREEN,
        };
        let reader = Builder::new().read(&frame(&start)).build();

        let mailbox = SnapshotMailbox::new();
        run_receiver(reader, &mailbox).await.unwrap();

        let assignment = mailbox.assignment().unwrap();
        assert_eq!(assignment.player_id, 4);
        assert_eq!(assignment.coords[0], Position::new(5, 40));
    }

    #[tokio::test]
    async fn test_receiver_read_error_marks_disconnected() {
        let reader = Builder::new()
            .read(&frame(&board_update(1)))
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();

        let mailbox = SnapshotMailbox::new();
        let result = run_receiver(reader, &mailbox).await;

        assert!(matches!(result, Err(TransportError::Io(_))));
        assert!(!mailbox.is_connected());
        assert_eq!(mailbox.latest().unwrap().tick, 1);
    }

    #[tokio::test]
    async fn test_sender_writes_direction_then_quit() {
        let writer = Builder::new()
            .write(b"{\"type\":\"direction\",\"direction\":0}\n")
            .write(b"{\"type\":\"quit\"}\n")
            .build();

        let mut sender = InputSender::new(writer);
        sender.send_direction(Direction::Up).await.unwrap();
        sender.quit().await.unwrap();
    }

    #[tokio::test]
    async fn test_sender_surfaces_write_failure() {
        let writer = Builder::new()
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            .build();

        let mut sender = InputSender::new(writer);
        let result = sender.send_direction(Direction::Left).await;
        assert!(matches!(
            result,
            Err(ClientError::Transport(TransportError::Io(_)))
        ));
    }

    #[tokio::test]
    async fn test_client_renders_until_host_leaves() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let host = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let start = Message::Start {
                player_id: 1,
                coords: vec![Position::new(5, 5)],
                color: GREEN,
            };
            socket.write_all(&frame(&start)).await.unwrap();
            socket.write_all(&frame(&board_update(1))).await.unwrap();
            socket.write_all(&frame(&board_update(2))).await.unwrap();
        });

        let client = Client::connect(&addr.to_string()).await.unwrap();
        let mut renderer = RecordingRenderer::default();
        let input = LocalInput::new();
        let settings = ClientSettings {
            render_interval: Duration::from_millis(5),
            send_interval: Duration::from_millis(5),
        };

        client.run(&mut renderer, &input, settings).await.unwrap();
        host.await.unwrap();

        assert_eq!(renderer.ticks.last(), Some(&2));
        assert!(renderer.ticks.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(renderer.me, Some(1));
        assert!(renderer.disconnect.is_some());
    }

    #[test]
    fn test_settings_from_rates() {
        let settings = ClientSettings::from_rates(50, 10).unwrap();
        assert_eq!(settings.render_interval, Duration::from_millis(20));
        assert_eq!(settings.send_interval, Duration::from_millis(100));

        assert!(matches!(
            ClientSettings::from_rates(0, 10),
            Err(ClientError::InvalidRate {
                name: "render_fps",
                ..
            })
        ));
        assert!(matches!(
            ClientSettings::from_rates(60, u32::MAX),
            Err(ClientError::InvalidRate {
                name: "send_rate",
                ..
            })
        ));
        assert!(ClientSettings::from_rates(MAX_RATE, MAX_RATE).is_ok());
    }

    #[tokio::test]
    async fn test_run_rejects_zero_interval() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let host = tokio::spawn(async move { listener.accept().await.unwrap() });

        let client = Client::connect(&addr.to_string()).await.unwrap();
        let _socket = host.await.unwrap();

        let settings = ClientSettings {
            render_interval: Duration::ZERO,
            send_interval: Duration::from_millis(10),
        };
        let result = client
            .run(&mut RecordingRenderer::default(), &LocalInput::new(), settings)
            .await;
        assert!(matches!(
            result,
            Err(ClientError::ZeroInterval("render_interval"))
        ));
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = Client::connect(&addr.to_string()).await;
        assert!(matches!(result, Err(ClientError::Connect { .. })));
    }
}
