use std::time::{Duration, Instant};

use crate::backend::{GenerateResponse, GradeRequest, GradeResponse, Question};
use crate::cue::CueKind;
use crate::pacing::{self, PacingEngine};
use crate::quiz::{QuizRunner, QuizSignal};

/// First number shown by the countdown.
pub const COUNTDOWN_FROM: u8 = 3;
const COUNTDOWN_STEP: Duration = Duration::from_secs(1);
/// How long "GO!" stays up before reading starts.
const GO_HOLD: Duration = Duration::from_secs(1);

pub const QUIZ_COMPLETED: &str = "Quiz completed! Great job!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Phase {
    Input,
    Confirm,
    Countdown,
    Go,
    Reading,
    Recap,
    Quiz,
}

/// Lets a side effect fire at most once until explicitly re-armed.
#[derive(Debug, Clone, Copy, Default)]
pub struct OneShot {
    fired: bool,
}

impl OneShot {
    /// True the first time only.
    pub fn fire(&mut self) -> bool {
        !std::mem::replace(&mut self.fired, true)
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    pub fn rearm(&mut self) {
        self.fired = false;
    }
}

/// Work the session asks its owner to carry out.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEffect {
    Cue(CueKind),
    RequestGeneration { epoch: u64, text: String },
    RequestGrading { epoch: u64, request: GradeRequest },
}

/// The whole user journey, from pasted text to graded quiz.
///
/// `epoch` increases with every reading session so that responses to
/// requests from an earlier session can be recognized and dropped.
#[derive(Debug, Clone)]
pub struct Session {
    text: String,
    phase: Phase,
    countdown: Option<u8>,
    phase_deadline: Option<Instant>,
    recap: String,
    quiz: Vec<Question>,
    delay_ms: u64,
    pacing: Option<PacingEngine>,
    generation: OneShot,
    generation_error: Option<String>,
    runner: Option<QuizRunner>,
    epoch: u64,
    notice: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(pacing::DEFAULT_DELAY_MS)
    }
}

impl Session {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            text: String::new(),
            phase: Phase::Input,
            countdown: None,
            phase_deadline: None,
            recap: String::new(),
            quiz: Vec::new(),
            delay_ms: pacing::clamp_delay(delay_ms),
            pacing: None,
            generation: OneShot::default(),
            generation_error: None,
            runner: None,
            epoch: 0,
            notice: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn countdown(&self) -> Option<u8> {
        self.countdown
    }

    pub fn recap(&self) -> &str {
        &self.recap
    }

    pub fn quiz(&self) -> &[Question] {
        &self.quiz
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms
    }

    pub fn pacing(&self) -> Option<&PacingEngine> {
        self.pacing.as_ref()
    }

    pub fn runner(&self) -> Option<&QuizRunner> {
        self.runner.as_ref()
    }

    pub fn runner_mut(&mut self) -> Option<&mut QuizRunner> {
        self.runner.as_mut()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn generation_error(&self) -> Option<&str> {
        self.generation_error.as_deref()
    }

    pub fn generation_requested(&self) -> bool {
        self.generation.has_fired()
    }

    /// A generation request is out and nothing has come back yet.
    pub fn is_generating(&self) -> bool {
        self.phase == Phase::Reading
            && self.generation.has_fired()
            && self.generation_error.is_none()
    }

    /// Words in the text being edited.
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    pub fn input_char(&mut self, c: char) {
        if self.phase == Phase::Input {
            self.notice = None;
            self.text.push(c);
        }
    }

    pub fn input_str(&mut self, s: &str) {
        if self.phase == Phase::Input {
            self.notice = None;
            self.text.push_str(s);
        }
    }

    pub fn input_backspace(&mut self) {
        if self.phase == Phase::Input {
            self.text.pop();
        }
    }

    pub fn clear_input(&mut self) {
        if self.phase == Phase::Input {
            self.text.clear();
        }
    }

    fn transition(&mut self, to: Phase) {
        tracing::info!(from = %self.phase, to = %to, epoch = self.epoch, "phase change");
        self.phase = to;
    }

    /// Input -> Confirm, only with non-blank text.
    pub fn submit(&mut self) -> bool {
        if self.phase != Phase::Input || self.text.trim().is_empty() {
            return false;
        }
        self.notice = None;
        self.transition(Phase::Confirm);
        true
    }

    pub fn back_to_input(&mut self) -> bool {
        if self.phase != Phase::Confirm {
            return false;
        }
        self.transition(Phase::Input);
        true
    }

    /// Confirm -> Countdown. The first number is shown, and cued, right away.
    pub fn confirm(&mut self, now: Instant) -> Vec<SessionEffect> {
        if self.phase != Phase::Confirm {
            return Vec::new();
        }
        self.transition(Phase::Countdown);
        self.countdown = Some(COUNTDOWN_FROM);
        self.phase_deadline = Some(now + COUNTDOWN_STEP);
        vec![SessionEffect::Cue(CueKind::Beep)]
    }

    fn enter_reading(&mut self, now: Instant) {
        self.epoch += 1;
        self.generation.rearm();
        self.generation_error = None;
        self.pacing = Some(PacingEngine::new(&self.text, self.delay_ms, now));
        self.phase_deadline = None;
        self.transition(Phase::Reading);
    }

    /// Drives every timer of the current phase.
    pub fn on_tick(&mut self, now: Instant) -> Vec<SessionEffect> {
        let mut effects = Vec::new();
        match self.phase {
            Phase::Countdown => {
                let (Some(count), Some(deadline)) = (self.countdown, self.phase_deadline) else {
                    return effects;
                };
                if now < deadline {
                    return effects;
                }
                let next = count.saturating_sub(1);
                if next > 0 {
                    self.countdown = Some(next);
                    self.phase_deadline = Some(deadline + COUNTDOWN_STEP);
                    effects.push(SessionEffect::Cue(CueKind::Beep));
                } else {
                    self.countdown = None;
                    self.phase_deadline = Some(deadline + GO_HOLD);
                    self.transition(Phase::Go);
                    effects.push(SessionEffect::Cue(CueKind::Go));
                }
            }
            Phase::Go => {
                if self.phase_deadline.is_some_and(|deadline| now >= deadline) {
                    self.enter_reading(now);
                }
            }
            Phase::Reading => {
                let finished = self
                    .pacing
                    .as_mut()
                    .and_then(|engine| engine.on_tick(now));
                if let Some(reason) = finished {
                    if self.generation.fire() {
                        tracing::info!(
                            %reason,
                            epoch = self.epoch,
                            "reading finished, requesting recap"
                        );
                        effects.push(SessionEffect::RequestGeneration {
                            epoch: self.epoch,
                            text: self.text.clone(),
                        });
                    }
                }
            }
            Phase::Quiz => {
                let signal = self.runner.as_mut().and_then(|runner| runner.on_tick(now));
                if let Some(QuizSignal::RequestGrading(request)) = signal {
                    effects.push(SessionEffect::RequestGrading {
                        epoch: self.epoch,
                        request,
                    });
                }
            }
            Phase::Input | Phase::Confirm | Phase::Recap => {}
        }
        effects
    }

    pub fn toggle_play(&mut self, now: Instant) {
        if self.phase != Phase::Reading {
            return;
        }
        if let Some(engine) = self.pacing.as_mut() {
            engine.toggle_play(now);
        }
    }

    /// Changes the per-word delay by `delta_ms`, returning the new delay.
    pub fn adjust_delay(&mut self, delta_ms: i64, now: Instant) -> u64 {
        let target = self.delay_ms.saturating_add_signed(delta_ms);
        self.delay_ms = pacing::clamp_delay(target);
        if let Some(engine) = self.pacing.as_mut().filter(|e| !e.is_finished()) {
            engine.set_delay(self.delay_ms, now);
        }
        self.delay_ms
    }

    /// Stores the recap and quiz for the current reading session.
    ///
    /// Returns false for responses that belong to an earlier session or
    /// arrive after the session moved on.
    pub fn apply_generation(
        &mut self,
        epoch: u64,
        result: Result<GenerateResponse, String>,
    ) -> bool {
        if epoch != self.epoch || !self.is_generating() {
            tracing::warn!(
                epoch,
                current = self.epoch,
                phase = %self.phase,
                "dropping stale generation response"
            );
            return false;
        }
        match result {
            Ok(response) => {
                self.recap = response.summary;
                self.quiz = response.questions;
                self.transition(Phase::Recap);
            }
            Err(message) => {
                tracing::error!(epoch, "generation failed: {}", message);
                self.generation_error = Some(message);
            }
        }
        true
    }

    /// Issues a fresh generation request after a failure.
    pub fn retry_generation(&mut self) -> Option<SessionEffect> {
        if self.phase != Phase::Reading || self.generation_error.take().is_none() {
            return None;
        }
        tracing::info!(epoch = self.epoch, "retrying generation");
        Some(SessionEffect::RequestGeneration {
            epoch: self.epoch,
            text: self.text.clone(),
        })
    }

    /// Recap -> Quiz, on user request only.
    pub fn start_quiz(&mut self) -> bool {
        if self.phase != Phase::Recap {
            return false;
        }
        self.runner = Some(QuizRunner::new(self.quiz.clone(), self.text.clone()));
        self.transition(Phase::Quiz);
        true
    }

    pub fn apply_grading(&mut self, epoch: u64, result: Result<GradeResponse, String>) -> bool {
        if epoch != self.epoch || self.phase != Phase::Quiz {
            tracing::warn!(epoch, current = self.epoch, "dropping stale grading response");
            return false;
        }
        if let Err(message) = &result {
            tracing::error!(epoch, "grading failed: {}", message);
        }
        self.runner
            .as_mut()
            .is_some_and(|runner| runner.apply_grading(result))
    }

    pub fn retry_grading(&mut self) -> Option<SessionEffect> {
        if self.phase != Phase::Quiz {
            return None;
        }
        match self.runner.as_mut()?.retry_grading()? {
            QuizSignal::RequestGrading(request) => Some(SessionEffect::RequestGrading {
                epoch: self.epoch,
                request,
            }),
            QuizSignal::Done => None,
        }
    }

    /// Quiz -> Input once the runner reports it is done.
    ///
    /// Text, recap and quiz are kept; the input screen starts pre-filled.
    pub fn finish_quiz(&mut self) -> bool {
        let done = self.phase == Phase::Quiz
            && matches!(
                self.runner.as_ref().and_then(QuizRunner::finish),
                Some(QuizSignal::Done)
            );
        if !done {
            return false;
        }
        self.runner = None;
        self.pacing = None;
        self.notice = Some(QUIZ_COMPLETED.to_string());
        self.transition(Phase::Input);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GradedAnswer;
    use assert_matches::assert_matches;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn typed(text: &str) -> Session {
        let mut session = Session::default();
        session.input_str(text);
        session
    }

    /// Runs a session from Input up to Reading; returns when reading started.
    fn into_reading(session: &mut Session, t0: Instant) -> Instant {
        assert!(session.submit());
        session.confirm(t0);
        session.on_tick(t0 + secs(1));
        session.on_tick(t0 + secs(2));
        session.on_tick(t0 + secs(3));
        session.on_tick(t0 + secs(4));
        assert_eq!(session.phase(), Phase::Reading);
        t0 + secs(4)
    }

    /// Ticks every 25ms for `span`, collecting effects.
    fn run_for(session: &mut Session, from: Instant, span: Duration) -> Vec<SessionEffect> {
        let steps = span.as_millis() as u64 / 25;
        (1..=steps)
            .flat_map(|step| session.on_tick(from + Duration::from_millis(step * 25)))
            .collect()
    }

    #[test]
    fn one_shot_fires_once_until_rearmed() {
        let mut guard = OneShot::default();
        assert!(guard.fire());
        assert!(!guard.fire());
        assert!(guard.has_fired());
        guard.rearm();
        assert!(guard.fire());
    }

    #[test]
    fn blank_text_cannot_be_submitted() {
        let mut session = typed("  \n\t ");
        assert!(!session.submit());
        assert_eq!(session.phase(), Phase::Input);

        session.input_str("hello");
        assert!(session.submit());
        assert_eq!(session.phase(), Phase::Confirm);
    }

    #[test]
    fn editing_only_happens_on_input() {
        let mut session = typed("abc");
        session.input_backspace();
        assert_eq!(session.text(), "ab");
        assert_eq!(session.word_count(), 1);
        session.submit();
        session.input_char('x');
        assert_eq!(session.text(), "ab");
        assert!(session.back_to_input());
        session.clear_input();
        assert_eq!(session.text(), "");
    }

    #[test]
    fn countdown_beeps_then_goes() {
        let t0 = Instant::now();
        let mut session = typed("alpha beta");
        session.submit();

        assert_eq!(
            session.confirm(t0),
            vec![SessionEffect::Cue(CueKind::Beep)]
        );
        assert_eq!(session.phase(), Phase::Countdown);
        assert_eq!(session.countdown(), Some(3));

        assert!(session.on_tick(t0 + Duration::from_millis(999)).is_empty());
        assert_eq!(
            session.on_tick(t0 + secs(1)),
            vec![SessionEffect::Cue(CueKind::Beep)]
        );
        assert_eq!(session.countdown(), Some(2));
        session.on_tick(t0 + secs(2));
        assert_eq!(session.countdown(), Some(1));

        assert_eq!(
            session.on_tick(t0 + secs(3)),
            vec![SessionEffect::Cue(CueKind::Go)]
        );
        assert_eq!(session.phase(), Phase::Go);
        assert_eq!(session.countdown(), None);

        session.on_tick(t0 + Duration::from_millis(3_999));
        assert_eq!(session.phase(), Phase::Go);
        session.on_tick(t0 + secs(4));
        assert_eq!(session.phase(), Phase::Reading);
        assert_eq!(session.pacing().unwrap().words().len(), 2);
    }

    #[test]
    fn generation_is_requested_exactly_once() {
        let t0 = Instant::now();
        let mut session = typed("The quick brown fox jumps");
        let start = into_reading(&mut session, t0);

        let requests: Vec<_> = run_for(&mut session, start, secs(10))
            .into_iter()
            .filter_map(|effect| match effect {
                SessionEffect::RequestGeneration { epoch, text } => Some((epoch, text)),
                _ => None,
            })
            .collect();
        assert_eq!(
            requests,
            vec![(1, "The quick brown fox jumps".to_string())]
        );
        assert!(session.is_generating());
    }

    #[test]
    fn time_budget_ends_reading_even_when_paused() {
        let t0 = Instant::now();
        let mut session = typed("alpha beta gamma delta");
        let start = into_reading(&mut session, t0);
        session.toggle_play(start);

        assert!(session.on_tick(start + secs(119)).is_empty());
        assert_matches!(
            session.on_tick(start + secs(120)).as_slice(),
            [SessionEffect::RequestGeneration { .. }]
        );
        assert_eq!(session.pacing().unwrap().index(), 0);
    }

    #[test]
    fn generation_result_moves_to_recap() {
        let t0 = Instant::now();
        let mut session = typed("hi");
        let start = into_reading(&mut session, t0);
        session.on_tick(start + secs(1));

        let response = GenerateResponse {
            summary: "A greeting.".into(),
            questions: vec![Question::yes_no("Was it a greeting?")],
        };
        assert!(session.apply_generation(1, Ok(response)));
        assert_eq!(session.phase(), Phase::Recap);
        assert_eq!(session.recap(), "A greeting.");
        assert_eq!(session.quiz().len(), 1);
    }

    #[test]
    fn stale_generation_results_are_dropped() {
        let t0 = Instant::now();
        let mut session = typed("hi");
        let start = into_reading(&mut session, t0);

        // nothing requested yet
        assert!(!session.apply_generation(1, Ok(GenerateResponse::default())));
        session.on_tick(start + secs(1));
        assert!(!session.apply_generation(0, Ok(GenerateResponse::default())));
        assert_eq!(session.phase(), Phase::Reading);
        assert!(session.apply_generation(1, Ok(GenerateResponse::default())));
        assert!(!session.apply_generation(1, Ok(GenerateResponse::default())));
    }

    #[test]
    fn failed_generation_can_be_retried() {
        let t0 = Instant::now();
        let mut session = typed("hi");
        let start = into_reading(&mut session, t0);
        session.on_tick(start + secs(1));

        assert!(session.apply_generation(1, Err("timed out".into())));
        assert_eq!(session.phase(), Phase::Reading);
        assert_eq!(session.generation_error(), Some("timed out"));
        assert!(!session.is_generating());
        // the guard still holds while the error is shown
        assert!(session.on_tick(start + secs(2)).is_empty());

        assert_matches!(
            session.retry_generation(),
            Some(SessionEffect::RequestGeneration { epoch: 1, .. })
        );
        assert!(session.is_generating());
        assert_eq!(session.retry_generation(), None);
    }

    #[test]
    fn malformed_questions_lead_to_empty_quiz() {
        let t0 = Instant::now();
        let mut session = typed("hi");
        let start = into_reading(&mut session, t0);
        session.on_tick(start + secs(1));

        let response: GenerateResponse = serde_json::from_str(
            r#"{"summary": "Short.", "questions": "[{not json"}"#,
        )
        .unwrap();
        session.apply_generation(1, Ok(response));
        assert!(session.start_quiz());
        let runner = session.runner().unwrap();
        assert!(runner.is_empty());
        assert!(session.finish_quiz());
        assert_eq!(session.phase(), Phase::Input);
    }

    #[test]
    fn quiz_round_trip_returns_to_input_with_text_kept() {
        let t0 = Instant::now();
        let mut session = typed("The quick brown fox jumps");
        let start = into_reading(&mut session, t0);
        assert_eq!(run_for(&mut session, start, secs(5)).len(), 1);
        session.apply_generation(
            1,
            Ok(GenerateResponse {
                summary: "A fox jumps.".into(),
                questions: vec![Question::yes_no("Is fox brown?")],
            }),
        );

        assert!(!session.finish_quiz());
        assert!(session.start_quiz());
        let now = start + secs(6);
        assert!(session.runner_mut().unwrap().answer_yes(now));

        let effects = session.on_tick(now + secs(1));
        assert_matches!(
            effects.as_slice(),
            [SessionEffect::RequestGrading { epoch: 1, request }] => {
                assert_eq!(request.questions[0].user_answer, "Yes");
            }
        );
        assert!(session.on_tick(now + secs(2)).is_empty());

        let graded = GradeResponse {
            graded_answers: vec![GradedAnswer {
                question: "Is fox brown?".into(),
                answer: "Yes".into(),
                correct: true,
            }],
        };
        assert!(!session.apply_grading(7, Ok(graded.clone())));
        assert!(session.apply_grading(1, Ok(graded)));
        assert!(session.finish_quiz());

        assert_eq!(session.phase(), Phase::Input);
        assert_eq!(session.notice(), Some(QUIZ_COMPLETED));
        assert_eq!(session.text(), "The quick brown fox jumps");
        assert_eq!(session.recap(), "A fox jumps.");
    }

    #[test]
    fn new_reading_session_bumps_epoch_and_rearms_guard() {
        let t0 = Instant::now();
        let mut session = typed("hi");
        let start = into_reading(&mut session, t0);
        session.on_tick(start + secs(1));
        session.apply_generation(1, Ok(GenerateResponse::default()));
        session.start_quiz();
        session.finish_quiz();

        let start = into_reading(&mut session, start + secs(10));
        assert_eq!(session.epoch(), 2);
        assert!(!session.generation_requested());
        assert_matches!(
            session.on_tick(start + secs(1)).as_slice(),
            [SessionEffect::RequestGeneration { epoch: 2, .. }]
        );
    }

    #[test]
    fn delay_adjustment_is_clamped_and_reaches_engine() {
        let t0 = Instant::now();
        let mut session = typed("alpha beta");
        assert_eq!(session.adjust_delay(-1_000, t0), pacing::MIN_DELAY_MS);
        assert_eq!(session.adjust_delay(50, t0), 150);
        let start = into_reading(&mut session, t0);
        assert_eq!(session.adjust_delay(5_000, start), pacing::MAX_DELAY_MS);
        assert_eq!(session.pacing().unwrap().delay_ms(), pacing::MAX_DELAY_MS);
    }
}
