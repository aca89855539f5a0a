use std::time::{Duration, Instant};

/// Wall-clock ceiling for one reading session, measured from its start.
pub const TIME_BUDGET_SECS: u64 = 120;
pub const MIN_DELAY_MS: u64 = 100;
pub const MAX_DELAY_MS: u64 = 1000;
pub const DEFAULT_DELAY_MS: u64 = 400;
pub const DELAY_STEP_MS: u64 = 50;

/// Words shorter than this many characters are shown at double speed.
const SHORT_WORD_LEN: usize = 4;

const TIME_BUDGET: Duration = Duration::from_secs(TIME_BUDGET_SECS);

/// Splits text on runs of whitespace, dropping empty tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_owned).collect()
}

pub fn clamp_delay(delay_ms: u64) -> u64 {
    delay_ms.clamp(MIN_DELAY_MS, MAX_DELAY_MS)
}

/// How long `word` stays on screen for a given base delay.
///
/// Short words get half the base delay, floored at [`MIN_DELAY_MS`].
pub fn effective_delay(word: &str, base_ms: u64) -> Duration {
    if word.chars().count() < SHORT_WORD_LEN {
        // base * 0.5 ms, kept exact for odd bases
        Duration::from_micros(base_ms * 500).max(Duration::from_millis(MIN_DELAY_MS))
    } else {
        Duration::from_millis(base_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum FinishReason {
    /// Every word was shown.
    Exhausted,
    /// The time budget ran out first.
    OutOfTime,
}

/// Reveals the words of a text one at a time.
#[derive(Debug, Clone)]
pub struct PacingEngine {
    words: Vec<String>,
    index: usize,
    playing: bool,
    delay_ms: u64,
    started_at: Instant,
    next_advance_at: Option<Instant>,
    finished_at: Option<Instant>,
}

impl PacingEngine {
    /// Starts a session at `now`, already playing.
    pub fn new(text: &str, delay_ms: u64, now: Instant) -> Self {
        let mut engine = Self {
            words: tokenize(text),
            index: 0,
            playing: true,
            delay_ms: clamp_delay(delay_ms),
            started_at: now,
            next_advance_at: None,
            finished_at: None,
        };
        engine.next_advance_at = engine.schedule_from(now);
        engine
    }

    fn schedule_from(&self, now: Instant) -> Option<Instant> {
        self.words
            .get(self.index)
            .map(|word| now + effective_delay(word, self.delay_ms))
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current_word(&self) -> Option<&str> {
        self.words.get(self.index).map(String::as_str)
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn toggle_play(&mut self, now: Instant) {
        if self.is_finished() {
            return;
        }
        self.playing = !self.playing;
        // a resumed word gets its full delay again
        self.next_advance_at = if self.playing {
            self.schedule_from(now)
        } else {
            None
        };
    }

    /// Changes the base delay; the current word's timer restarts.
    pub fn set_delay(&mut self, delay_ms: u64, now: Instant) {
        self.delay_ms = clamp_delay(delay_ms);
        if self.playing {
            self.next_advance_at = self.schedule_from(now);
        }
    }

    pub fn faster(&mut self, now: Instant) {
        self.set_delay(self.delay_ms.saturating_sub(DELAY_STEP_MS), now);
    }

    pub fn slower(&mut self, now: Instant) {
        self.set_delay(self.delay_ms + DELAY_STEP_MS, now);
    }

    fn budget_exhausted(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started_at) >= TIME_BUDGET
    }

    /// Advances at most one word and evaluates the completion condition.
    ///
    /// Returns the finish reason on every call once the session is complete;
    /// callers that must act only once guard on their side.
    pub fn on_tick(&mut self, now: Instant) -> Option<FinishReason> {
        if self.playing && !self.budget_exhausted(now) {
            if let Some(deadline) = self.next_advance_at {
                if now >= deadline && self.index < self.words.len() {
                    self.index += 1;
                    self.next_advance_at = self.schedule_from(now);
                }
            }
        }

        let reason = if self.index >= self.words.len() {
            FinishReason::Exhausted
        } else if self.budget_exhausted(now) {
            FinishReason::OutOfTime
        } else {
            return None;
        };

        self.playing = false;
        self.next_advance_at = None;
        self.finished_at.get_or_insert(now);
        Some(reason)
    }

    /// Whole seconds left in the budget.
    pub fn seconds_left(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.started_at).as_secs();
        TIME_BUDGET_SECS.saturating_sub(elapsed)
    }

    /// Fraction of words already shown.
    pub fn progress(&self) -> f64 {
        if self.words.is_empty() {
            return 1.0;
        }
        (self.index as f64 / self.words.len() as f64).min(1.0)
    }

    /// Fraction of the time budget already used, at 1-second granularity.
    pub fn time_progress(&self, now: Instant) -> f64 {
        (TIME_BUDGET_SECS - self.seconds_left(now)) as f64 / TIME_BUDGET_SECS as f64
    }

    /// Words per minute actually achieved, up to completion.
    pub fn reading_wpm(&self, now: Instant) -> f64 {
        let end = self.finished_at.unwrap_or(now);
        let minutes = end.saturating_duration_since(self.started_at).as_secs_f64() / 60.0;
        if minutes <= 0.0 {
            return 0.0;
        }
        self.index as f64 / minutes
    }
}
