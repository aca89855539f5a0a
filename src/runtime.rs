use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyEvent, KeyEventKind, MouseEvent};

use crate::backend::{GenerateResponse, GradeResponse};

/// Tick interval of the main loop. Small enough for the shortest word delay.
pub const TICK_RATE_MS: u64 = 25;

/// Unified event type consumed by the app runner
#[derive(Clone, Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Paste(String),
    Mouse(MouseEvent),
    Resize,
    Tick,
    /// Recap and quiz for the reading session numbered `epoch`.
    Generated {
        epoch: u64,
        result: Result<GenerateResponse, String>,
    },
    Graded {
        epoch: u64,
        result: Result<GradeResponse, String>,
    },
}

/// Source of app events (keyboard, mouse, backend results, ...)
pub trait EventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    /// Returns Ok(event) if an event arrives before the timeout, or Err(Timeout) if it expires.
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError>;
}

/// Production event source using crossterm
pub struct CrosstermEventSource {
    tx: Sender<AppEvent>,
    rx: Receiver<AppEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        let input_tx = tx.clone();

        std::thread::spawn(move || loop {
            let ev = match event::read() {
                // key release events would double every keystroke on some platforms
                Ok(CtEvent::Key(key)) if key.kind != KeyEventKind::Release => AppEvent::Key(key),
                Ok(CtEvent::Paste(text)) => AppEvent::Paste(text),
                Ok(CtEvent::Mouse(mouse)) => AppEvent::Mouse(mouse),
                Ok(CtEvent::Resize(_, _)) => AppEvent::Resize,
                Ok(_) => continue,
                Err(e) => {
                    tracing::error!("terminal input closed: {}", e);
                    break;
                }
            };
            if input_tx.send(ev).is_err() {
                break;
            }
        });

        Self { tx, rx }
    }

    /// A handle for posting events from elsewhere, e.g. backend tasks.
    pub fn sender(&self) -> Sender<AppEvent> {
        self.tx.clone()
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for FixedTicker {
    fn default() -> Self {
        Self::new(Duration::from_millis(TICK_RATE_MS))
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Test event source for unit tests
pub struct TestEventSource {
    rx: Receiver<AppEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<AppEvent>) -> Self {
        Self { rx }
    }
}

impl EventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Runner that advances the application one event/tick at a time
pub struct Runner<E: EventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: EventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    pub fn event_source(&self) -> &E {
        &self.event_source
    }

    /// Blocks up to tick interval and returns the next event, or Tick on timeout
    pub fn step(&self) -> AppEvent {
        match self.event_source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => AppEvent::Tick,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::mpsc;

    #[test]
    fn step_returns_tick_on_timeout() {
        let (_tx, rx) = mpsc::channel();
        let es = TestEventSource::new(rx);
        let ticker = FixedTicker::new(Duration::from_millis(1));
        let runner = Runner::new(es, ticker);

        assert_matches!(runner.step(), AppEvent::Tick);
    }

    #[test]
    fn step_passes_through_events() {
        let (tx, rx) = mpsc::channel();
        tx.send(AppEvent::Resize).unwrap();
        tx.send(AppEvent::Generated {
            epoch: 3,
            result: Err("offline".into()),
        })
        .unwrap();
        let runner = Runner::new(TestEventSource::new(rx), FixedTicker::default());

        assert_matches!(runner.step(), AppEvent::Resize);
        assert_matches!(runner.step(), AppEvent::Generated { epoch: 3, result: Err(_) });
    }

    #[test]
    fn disconnected_source_keeps_ticking() {
        let (tx, rx) = mpsc::channel::<AppEvent>();
        drop(tx);
        let runner = Runner::new(
            TestEventSource::new(rx),
            FixedTicker::new(Duration::from_millis(1)),
        );
        assert_matches!(runner.step(), AppEvent::Tick);
    }

    #[test]
    fn default_ticker_uses_tick_rate() {
        assert_eq!(
            FixedTicker::default().interval(),
            Duration::from_millis(TICK_RATE_MS)
        );
    }
}
