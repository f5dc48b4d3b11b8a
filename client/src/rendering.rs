use log::{info, warn};
use shared::{PlayerId, WorldSnapshot};

/// Consumer of snapshots. Drawing the grid is left to the implementor.
pub trait Renderer {
    /// Called at most once per render frame, only with a snapshot newer
    /// than the previous one.
    fn render(&mut self, snapshot: &WorldSnapshot, me: Option<PlayerId>);

    /// Called once when the connection to the host is gone.
    fn disconnected(&mut self, reason: &str);
}

/// Headless renderer that logs a summary line per snapshot.
#[derive(Debug, Default)]
pub struct LogRenderer {
    frames: u64,
    was_alive: bool,
}

impl LogRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Renderer for LogRenderer {
    fn render(&mut self, snapshot: &WorldSnapshot, me: Option<PlayerId>) {
        self.frames += 1;

        let mine = me.and_then(|id| snapshot.snake(id));
        match mine.and_then(|snake| snake.head().map(|head| (snake, head))) {
            Some((snake, head)) => {
                self.was_alive = true;
                info!(
                    "Tick {}: {} snake(s) alive, you are at ({}, {}) heading {:?}",
                    snapshot.tick,
                    snapshot.snakes.len(),
                    head.x,
                    head.y,
                    snake.direction
                );
            }
            None => {
                if self.was_alive {
                    self.was_alive = false;
                    info!("Tick {}: you have been eliminated", snapshot.tick);
                }
                info!(
                    "Tick {}: {} snake(s) alive",
                    snapshot.tick,
                    snapshot.snakes.len()
                );
            }
        }
    }

    fn disconnected(&mut self, reason: &str) {
        warn!("Disconnected from host: {}", reason);
    }
}
