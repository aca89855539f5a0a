use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Instant;

use crossterm::event::{
    KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use ratatui::layout::{Position, Rect};
use tokio::runtime::Handle;

use crate::backend::{QuestionKind, StudyBackend};
use crate::config::{Config, ConfigStore};
use crate::cue::Cue;
use crate::pacing::DELAY_STEP_MS;
use crate::quiz::{QuizRunner, QuizStatus};
use crate::runtime::AppEvent;
use crate::session::{Phase, Session, SessionEffect};
use crate::ui;

/// Terminal columns are converted to pixels with this cell width for swipes.
pub const CELL_WIDTH_PX: f64 = 8.0;

/// What the main loop should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Redraw,
    Quit,
}

impl Flow {
    fn or(self, other: Flow) -> Flow {
        match (self, other) {
            (Flow::Quit, _) | (_, Flow::Quit) => Flow::Quit,
            (Flow::Redraw, _) | (_, Flow::Redraw) => Flow::Redraw,
            _ => Flow::Continue,
        }
    }
}

/// Owns the session and carries out its effects: cues, backend requests
/// and config persistence.
pub struct App {
    session: Session,
    config: Config,
    store: Option<Box<dyn ConfigStore>>,
    backend: Arc<dyn StudyBackend>,
    handle: Handle,
    events: Sender<AppEvent>,
    cue: Box<dyn Cue>,
    viewport: Option<Rect>,
}

impl App {
    /// Backend results are posted to `events` from tasks spawned on `handle`.
    pub fn new(
        config: Config,
        backend: Arc<dyn StudyBackend>,
        handle: Handle,
        events: Sender<AppEvent>,
        cue: Box<dyn Cue>,
    ) -> Self {
        Self {
            session: Session::new(config.delay_ms),
            config,
            store: None,
            backend,
            handle,
            events,
            cue,
            viewport: None,
        }
    }

    /// Persists speed changes through `store`.
    pub fn with_store(mut self, store: Box<dyn ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Pre-fills the input screen.
    pub fn with_text(mut self, text: &str) -> Self {
        self.session.input_str(text);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Records the size of the last drawn frame, for mouse hit tests.
    pub fn set_viewport(&mut self, area: Rect) {
        self.viewport = Some(area);
    }

    /// Applies one event, then lets the session's timers run.
    pub fn handle_event(&mut self, event: AppEvent, now: Instant) -> Flow {
        let flow = match event {
            AppEvent::Key(key) => self.on_key(key, now),
            AppEvent::Paste(text) => self.on_paste(&text),
            AppEvent::Mouse(mouse) => self.on_mouse(mouse, now),
            AppEvent::Resize => Flow::Redraw,
            AppEvent::Tick => Flow::Continue,
            AppEvent::Generated { epoch, result } => {
                self.session.apply_generation(epoch, result);
                Flow::Redraw
            }
            AppEvent::Graded { epoch, result } => {
                self.session.apply_grading(epoch, result);
                Flow::Redraw
            }
        };
        if flow == Flow::Quit {
            return flow;
        }
        flow.or(self.tick(now))
    }

    fn tick(&mut self, now: Instant) -> Flow {
        let effects = self.session.on_tick(now);
        let animating = match self.session.phase() {
            Phase::Countdown | Phase::Go | Phase::Reading => true,
            Phase::Quiz => self.session.runner().is_some_and(|r| r.is_flipping()),
            Phase::Input | Phase::Confirm | Phase::Recap => false,
        };
        let flow = if animating || !effects.is_empty() {
            Flow::Redraw
        } else {
            Flow::Continue
        };
        self.dispatch(effects);
        flow
    }

    fn dispatch(&mut self, effects: impl IntoIterator<Item = SessionEffect>) {
        for effect in effects {
            match effect {
                SessionEffect::Cue(kind) => self.cue.play(kind),
                SessionEffect::RequestGeneration { epoch, text } => {
                    let words = text.split_whitespace().count();
                    tracing::info!(epoch, words, "sending text for recap");
                    let backend = Arc::clone(&self.backend);
                    let events = self.events.clone();
                    self.handle.spawn(async move {
                        let result = backend.generate(&text).await.map_err(|e| e.to_string());
                        if events.send(AppEvent::Generated { epoch, result }).is_err() {
                            tracing::debug!(epoch, "ui gone, dropping recap");
                        }
                    });
                }
                SessionEffect::RequestGrading { epoch, request } => {
                    let answers = request.questions.len();
                    tracing::info!(epoch, answers, "sending answers for grading");
                    let backend = Arc::clone(&self.backend);
                    let events = self.events.clone();
                    self.handle.spawn(async move {
                        let result = backend.grade(&request).await.map_err(|e| e.to_string());
                        if events.send(AppEvent::Graded { epoch, result }).is_err() {
                            tracing::debug!(epoch, "ui gone, dropping grades");
                        }
                    });
                }
            }
        }
    }

    fn on_key(&mut self, key: KeyEvent, now: Instant) -> Flow {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        if key.code == KeyCode::Esc || (ctrl && key.code == KeyCode::Char('c')) {
            return Flow::Quit;
        }

        match self.session.phase() {
            Phase::Input => match key.code {
                KeyCode::Char('u') if ctrl => self.session.clear_input(),
                KeyCode::Char(c) if !ctrl => self.session.input_char(c),
                KeyCode::Backspace => self.session.input_backspace(),
                KeyCode::Enter => {
                    self.session.submit();
                }
                _ => return Flow::Continue,
            },
            Phase::Confirm => match key.code {
                KeyCode::Enter | KeyCode::Char('y') => {
                    let effects = self.session.confirm(now);
                    self.dispatch(effects);
                }
                KeyCode::Char('b') | KeyCode::Char('n') | KeyCode::Backspace => {
                    self.session.back_to_input();
                }
                _ => return Flow::Continue,
            },
            Phase::Countdown | Phase::Go => return Flow::Continue,
            Phase::Reading => match key.code {
                KeyCode::Char(' ') => self.session.toggle_play(now),
                KeyCode::Up | KeyCode::Char('+') => self.change_delay(-(DELAY_STEP_MS as i64), now),
                KeyCode::Down | KeyCode::Char('-') => self.change_delay(DELAY_STEP_MS as i64, now),
                KeyCode::Char('r') => {
                    let effect = self.session.retry_generation();
                    self.dispatch(effect);
                }
                _ => return Flow::Continue,
            },
            Phase::Recap => match key.code {
                KeyCode::Enter | KeyCode::Char(' ') => {
                    self.session.start_quiz();
                }
                _ => return Flow::Continue,
            },
            Phase::Quiz => return self.on_quiz_key(key, now),
        }
        Flow::Redraw
    }

    fn on_quiz_key(&mut self, key: KeyEvent, now: Instant) -> Flow {
        let Some(runner) = self.session.runner_mut() else {
            return Flow::Continue;
        };
        if *runner.status() == QuizStatus::Answering && !runner.is_empty() {
            return Self::on_answer_key(runner, key, now);
        }

        let failed = matches!(runner.status(), QuizStatus::GradingFailed(_));
        match key.code {
            KeyCode::Char('r') if failed => {
                let effect = self.session.retry_grading();
                self.dispatch(effect);
            }
            KeyCode::Enter => {
                self.session.finish_quiz();
            }
            _ => return Flow::Continue,
        }
        Flow::Redraw
    }

    fn on_answer_key(runner: &mut QuizRunner, key: KeyEvent, now: Instant) -> Flow {
        let kind = runner.current().map(|q| q.kind);
        match (key.code, kind) {
            (KeyCode::Left, _) => runner.back(),
            (KeyCode::Right, _) => runner.forward(),
            (KeyCode::Tab, _) => {
                runner.dont_know(now);
            }
            (KeyCode::Char('y'), Some(QuestionKind::YesNo)) => {
                runner.answer_yes(now);
            }
            (KeyCode::Char('n'), Some(QuestionKind::YesNo)) => {
                runner.answer_no(now);
            }
            (KeyCode::Char('d'), Some(QuestionKind::YesNo)) => {
                runner.dont_know(now);
            }
            (KeyCode::Char(c), Some(QuestionKind::FreeText)) => runner.type_char(c),
            (KeyCode::Backspace, Some(QuestionKind::FreeText)) => runner.backspace(),
            (KeyCode::Enter, Some(QuestionKind::FreeText)) => {
                runner.submit_text(now);
            }
            _ => return Flow::Continue,
        }
        Flow::Redraw
    }

    fn on_paste(&mut self, text: &str) -> Flow {
        match self.session.phase() {
            Phase::Input => self.session.input_str(text),
            Phase::Quiz => {
                if let Some(runner) = self.session.runner_mut() {
                    text.chars().for_each(|c| runner.type_char(c));
                }
            }
            _ => return Flow::Continue,
        }
        Flow::Redraw
    }

    fn on_mouse(&mut self, mouse: MouseEvent, now: Instant) -> Flow {
        let on_card = self.viewport.is_some_and(|area| {
            ui::card_area(area).contains(Position::new(mouse.column, mouse.row))
        });
        let Some(runner) = self
            .session
            .runner_mut()
            .filter(|r| *r.status() == QuizStatus::Answering)
        else {
            return Flow::Continue;
        };
        let x = f64::from(mouse.column) * CELL_WIDTH_PX;
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) if on_card => {
                runner.swipe_start(x);
                Flow::Continue
            }
            MouseEventKind::Up(MouseButton::Left) => {
                if runner.swipe_end(x, now) {
                    Flow::Redraw
                } else {
                    Flow::Continue
                }
            }
            _ => Flow::Continue,
        }
    }

    fn change_delay(&mut self, delta_ms: i64, now: Instant) {
        let delay_ms = self.session.adjust_delay(delta_ms, now);
        if delay_ms == self.config.delay_ms {
            return;
        }
        self.config.delay_ms = delay_ms;
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&self.config) {
                tracing::warn!("could not save config: {}", e);
            }
        }
    }
}
