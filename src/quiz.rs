use std::time::{Duration, Instant};

use crate::backend::{
    AnswerPair, GradeRequest, GradeResponse, GradedAnswer, Question, QuestionKind,
};
use crate::session::OneShot;

/// Delay between an answer and the next card appearing.
pub const FLIP_MS: u64 = 300;
/// A leftward drag longer than this counts as "Don't know".
pub const SWIPE_THRESHOLD_PX: f64 = 75.0;
pub const DONT_KNOW: &str = "Don't know";
pub const YES: &str = "Yes";
pub const NO: &str = "No";

/// One user response to one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRecord {
    pub question: String,
    pub user_answer: String,
    /// Unset until grading, except for "Don't know".
    pub correct: Option<bool>,
}

impl AnswerRecord {
    fn dont_know(question: &str) -> Self {
        Self {
            question: question.to_string(),
            user_answer: DONT_KNOW.to_string(),
            correct: Some(false),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QuizStatus {
    Answering,
    Grading,
    Graded(Vec<GradedAnswer>),
    GradingFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum QuizSignal {
    RequestGrading(GradeRequest),
    Done,
}

/// Tracks a horizontal drag on the card.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwipeGesture {
    start_x: Option<f64>,
}

impl SwipeGesture {
    pub fn start(&mut self, x: f64) {
        self.start_x = Some(x);
    }

    /// True when the drag ended far enough to the left of where it began.
    pub fn end(&mut self, x: f64) -> bool {
        match self.start_x.take() {
            Some(start) => start - x > SWIPE_THRESHOLD_PX,
            None => false,
        }
    }
}

/// Walks the user through the questions in order and collects answers.
#[derive(Debug, Clone)]
pub struct QuizRunner {
    questions: Vec<Question>,
    original_text: String,
    answers: Vec<AnswerRecord>,
    view_index: usize,
    draft: String,
    flip_until: Option<Instant>,
    swipe: SwipeGesture,
    grading: OneShot,
    status: QuizStatus,
}

impl QuizRunner {
    pub fn new(questions: Vec<Question>, original_text: impl Into<String>) -> Self {
        Self {
            questions,
            original_text: original_text.into(),
            answers: Vec::new(),
            view_index: 0,
            draft: String::new(),
            flip_until: None,
            swipe: SwipeGesture::default(),
            grading: OneShot::default(),
            status: QuizStatus::Answering,
        }
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn answers(&self) -> &[AnswerRecord] {
        &self.answers
    }

    pub fn status(&self) -> &QuizStatus {
        &self.status
    }

    pub fn view_index(&self) -> usize {
        self.view_index
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn is_flipping(&self) -> bool {
        self.flip_until.is_some()
    }

    /// The question on screen, if any.
    pub fn current(&self) -> Option<&Question> {
        self.questions.get(self.view_index)
    }

    /// The recorded answer for the question on screen, when revisiting.
    pub fn reviewed_answer(&self) -> Option<&AnswerRecord> {
        self.answers.get(self.view_index)
    }

    pub fn grading_requested(&self) -> bool {
        self.grading.has_fired()
    }

    /// Answers are accepted only for the first unanswered question.
    fn answerable(&self) -> Option<&Question> {
        if self.status != QuizStatus::Answering
            || self.flip_until.is_some()
            || self.view_index != self.answers.len()
        {
            return None;
        }
        self.questions.get(self.view_index)
    }

    pub fn can_submit_text(&self) -> bool {
        matches!(self.answerable(), Some(q) if q.kind == QuestionKind::FreeText)
            && !self.draft.trim().is_empty()
    }

    fn record(&mut self, record: AnswerRecord, now: Instant) {
        tracing::debug!(
            index = self.answers.len(),
            answer = %record.user_answer,
            "answer recorded"
        );
        self.answers.push(record);
        self.draft.clear();
        self.flip_until = Some(now + Duration::from_millis(FLIP_MS));
    }

    fn answer_choice(&mut self, choice: &str, now: Instant) -> bool {
        let question = match self.answerable() {
            Some(q) if q.kind == QuestionKind::YesNo => q.text.clone(),
            _ => return false,
        };
        self.record(
            AnswerRecord {
                question,
                user_answer: choice.to_string(),
                correct: None,
            },
            now,
        );
        true
    }

    pub fn answer_yes(&mut self, now: Instant) -> bool {
        self.answer_choice(YES, now)
    }

    pub fn answer_no(&mut self, now: Instant) -> bool {
        self.answer_choice(NO, now)
    }

    pub fn dont_know(&mut self, now: Instant) -> bool {
        let Some(question) = self.answerable().map(|q| q.text.clone()) else {
            return false;
        };
        self.record(AnswerRecord::dont_know(&question), now);
        true
    }

    pub fn type_char(&mut self, c: char) {
        if matches!(self.answerable(), Some(q) if q.kind == QuestionKind::FreeText) {
            self.draft.push(c);
        }
    }

    pub fn backspace(&mut self) {
        if self.answerable().is_some() {
            self.draft.pop();
        }
    }

    /// Submits the typed answer; ignored while the trimmed draft is empty.
    pub fn submit_text(&mut self, now: Instant) -> bool {
        if !self.can_submit_text() {
            return false;
        }
        let Some(question) = self.answerable().map(|q| q.text.clone()) else {
            return false;
        };
        let user_answer = self.draft.trim().to_string();
        self.record(
            AnswerRecord {
                question,
                user_answer,
                correct: None,
            },
            now,
        );
        true
    }

    /// Shows the previous question. Its recorded answer is left untouched.
    pub fn back(&mut self) {
        if self.flip_until.is_none() && self.status == QuizStatus::Answering && self.view_index > 0
        {
            self.view_index -= 1;
        }
    }

    /// Moves toward the first unanswered question, never past it.
    pub fn forward(&mut self) {
        if self.flip_until.is_none() && self.view_index < self.answers.len() {
            self.view_index += 1;
        }
    }

    pub fn swipe_start(&mut self, x: f64) {
        self.swipe.start(x);
    }

    /// Ends a drag; a long enough left swipe acts as "Don't know".
    pub fn swipe_end(&mut self, x: f64, now: Instant) -> bool {
        self.swipe.end(x) && self.dont_know(now)
    }

    pub fn grade_request(&self) -> GradeRequest {
        GradeRequest {
            questions: self
                .answers
                .iter()
                .map(|record| AnswerPair {
                    question: record.question.clone(),
                    user_answer: record.user_answer.clone(),
                })
                .collect(),
            original_text: self.original_text.clone(),
        }
    }

    /// Finishes a pending flip and fires grading once every question is answered.
    pub fn on_tick(&mut self, now: Instant) -> Option<QuizSignal> {
        if let Some(until) = self.flip_until {
            if now < until {
                return None;
            }
            self.flip_until = None;
            self.view_index = self.answers.len();
        }

        if self.questions.is_empty() || self.answers.len() != self.questions.len() {
            return None;
        }
        if !self.grading.fire() {
            return None;
        }
        self.status = QuizStatus::Grading;
        tracing::info!(answers = self.answers.len(), "all questions answered, grading");
        Some(QuizSignal::RequestGrading(self.grade_request()))
    }

    /// Stores the grader's verdicts. Returns false when no grading was pending.
    pub fn apply_grading(&mut self, result: Result<GradeResponse, String>) -> bool {
        if self.status != QuizStatus::Grading {
            return false;
        }
        match result {
            Ok(response) => {
                let verdicts = match_verdicts(&self.answers, &response.graded_answers);
                for (record, verdict) in self.answers.iter_mut().zip(verdicts) {
                    if record.correct.is_none() {
                        record.correct = verdict;
                    }
                }
                let ungraded = self.ungraded();
                if ungraded > 0 {
                    tracing::warn!(ungraded, "grader left some answers without a verdict");
                }
                self.status = QuizStatus::Graded(response.graded_answers);
            }
            Err(message) => {
                self.status = QuizStatus::GradingFailed(message);
            }
        }
        true
    }

    /// Re-sends the grading request after a failure.
    pub fn retry_grading(&mut self) -> Option<QuizSignal> {
        if !matches!(self.status, QuizStatus::GradingFailed(_)) {
            return None;
        }
        self.status = QuizStatus::Grading;
        Some(QuizSignal::RequestGrading(self.grade_request()))
    }

    /// The terminal signal, once there is nothing left to do on this quiz.
    pub fn finish(&self) -> Option<QuizSignal> {
        match self.status {
            QuizStatus::Graded(_) | QuizStatus::GradingFailed(_) => Some(QuizSignal::Done),
            QuizStatus::Answering if self.questions.is_empty() => Some(QuizSignal::Done),
            _ => None,
        }
    }

    /// Correct answers out of the answers that got a verdict, once graded.
    pub fn score(&self) -> Option<(usize, usize)> {
        match self.status {
            QuizStatus::Graded(_) => Some((
                self.answers
                    .iter()
                    .filter(|record| record.correct == Some(true))
                    .count(),
                self.answers
                    .iter()
                    .filter(|record| record.correct.is_some())
                    .count(),
            )),
            _ => None,
        }
    }

    /// Answers the grader returned no verdict for.
    pub fn ungraded(&self) -> usize {
        self.answers
            .iter()
            .filter(|record| record.correct.is_none())
            .count()
    }
}

/// Pairs each answer with a verdict: by question text first, then by
/// position among the verdicts no question claimed.
fn match_verdicts(answers: &[AnswerRecord], graded: &[GradedAnswer]) -> Vec<Option<bool>> {
    let mut used = vec![false; graded.len()];
    let mut verdicts: Vec<Option<bool>> = answers
        .iter()
        .map(|record| {
            let question = record.question.trim();
            let j = graded
                .iter()
                .enumerate()
                .position(|(j, g)| !used[j] && g.question.trim() == question)?;
            used[j] = true;
            Some(graded[j].correct)
        })
        .collect();

    for (i, verdict) in verdicts.iter_mut().enumerate() {
        if verdict.is_some() {
            continue;
        }
        if let Some(g) = graded.get(i).filter(|_| !used[i]) {
            used[i] = true;
            *verdict = Some(g.correct);
        }
    }
    verdicts
}
