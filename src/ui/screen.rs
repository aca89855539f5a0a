use std::time::Instant;

use itertools::Itertools;
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph, Widget, Wrap},
};

use super::{bold_style, centered_rows, dim_style, error_style, fit_width, italic_style, legend};
use crate::backend::QuestionKind;
use crate::quiz::{QuizRunner, QuizStatus, DONT_KNOW};
use crate::session::{Phase, Session};

/// Seconds left at which the timer turns red.
const LOW_TIME_SECS: u64 = 10;

/// A UI Screen boundary: renders one phase of the session
pub trait Screen {
    fn render(&self, session: &Session, now: Instant, area: Rect, buf: &mut Buffer);
}

/// Text entry with a live word count
pub struct InputScreen;

impl Screen for InputScreen {
    fn render(&self, session: &Session, _now: Instant, area: Rect, buf: &mut Buffer) {
        let chunks = Layout::vertical([
            Constraint::Length(1), // title
            Constraint::Length(1), // notice
            Constraint::Min(3),    // text
            Constraint::Length(1), // word count
            Constraint::Length(1), // legend
        ])
        .split(area);

        Paragraph::new(Span::styled(
            "Paste or type the text you want to speed-read",
            bold_style(),
        ))
        .render(chunks[0], buf);

        if let Some(notice) = session.notice() {
            Paragraph::new(Span::styled(
                notice.to_string(),
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            ))
            .render(chunks[1], buf);
        }

        let text = Line::from(vec![
            Span::raw(session.text().to_string()),
            Span::styled("▏", dim_style()),
        ]);
        Paragraph::new(text)
            .block(Block::default().borders(Borders::ALL).title("Text"))
            .wrap(Wrap { trim: false })
            .render(chunks[2], buf);

        let words = session.word_count();
        Paragraph::new(Span::styled(
            format!("{} word{}", words, if words == 1 { "" } else { "s" }),
            dim_style(),
        ))
        .render(chunks[3], buf);

        legend(&[("enter", "start"), ("ctrl+u", "clear"), ("esc", "quit")]).render(chunks[4], buf);
    }
}

/// Last chance to go back before the countdown
pub struct ConfirmScreen;

impl Screen for ConfirmScreen {
    fn render(&self, session: &Session, _now: Instant, area: Rect, buf: &mut Buffer) {
        let rows = centered_rows(area, 5);
        let chunks = Layout::vertical([Constraint::Length(1); 5]).split(rows);

        Paragraph::new(Span::styled(
            format!(
                "Ready to read {} words at {} ms per word?",
                session.word_count(),
                session.delay_ms()
            ),
            bold_style(),
        ))
        .alignment(Alignment::Center)
        .render(chunks[0], buf);

        let preview = session.text().split_whitespace().take(12).join(" ");
        Paragraph::new(Span::styled(
            fit_width(&preview, usize::from(area.width)),
            italic_style(),
        ))
        .alignment(Alignment::Center)
        .render(chunks[2], buf);

        legend(&[("enter", "start"), ("b", "back"), ("esc", "quit")])
            .alignment(Alignment::Center)
            .render(chunks[4], buf);
    }
}

pub struct CountdownScreen;

impl Screen for CountdownScreen {
    fn render(&self, session: &Session, _now: Instant, area: Rect, buf: &mut Buffer) {
        let Some(count) = session.countdown() else {
            return;
        };
        Paragraph::new(Span::styled(
            count.to_string(),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ))
        .alignment(Alignment::Center)
        .render(centered_rows(area, 1), buf);
    }
}

pub struct GoScreen;

impl Screen for GoScreen {
    fn render(&self, _session: &Session, _now: Instant, area: Rect, buf: &mut Buffer) {
        Paragraph::new(Span::styled(
            "GO!",
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        ))
        .alignment(Alignment::Center)
        .render(centered_rows(area, 1), buf);
    }
}

/// One word at a time, with word and time progress
pub struct ReadingScreen;

impl Screen for ReadingScreen {
    fn render(&self, session: &Session, now: Instant, area: Rect, buf: &mut Buffer) {
        let Some(engine) = session.pacing() else {
            return;
        };
        let chunks = Layout::vertical([
            Constraint::Length(1), // position and time left
            Constraint::Length(1), // word progress
            Constraint::Length(1), // time progress
            Constraint::Min(1),    // word
            Constraint::Length(1), // speed
            Constraint::Length(1), // legend
        ])
        .split(area);

        let total = engine.words().len();
        let header =
            Layout::horizontal([Constraint::Fill(1), Constraint::Fill(1)]).split(chunks[0]);
        Paragraph::new(Span::styled(
            format!("Word {} of {}", (engine.index() + 1).min(total), total),
            bold_style(),
        ))
        .render(header[0], buf);

        let seconds_left = engine.seconds_left(now);
        let timer_style = if seconds_left <= LOW_TIME_SECS {
            error_style()
        } else {
            bold_style()
        };
        Paragraph::new(Span::styled(format!("{seconds_left}s left"), timer_style))
            .alignment(Alignment::Right)
            .render(header[1], buf);

        Gauge::default()
            .gauge_style(Style::default().fg(Color::Magenta))
            .ratio(engine.progress())
            .label(format!("{:.0}% read", engine.progress() * 100.0))
            .render(chunks[1], buf);
        Gauge::default()
            .gauge_style(Style::default().fg(Color::Cyan))
            .ratio(engine.time_progress(now))
            .label("time")
            .render(chunks[2], buf);

        let middle = centered_rows(chunks[3], 1);
        if let Some(error) = session.generation_error() {
            Paragraph::new(Line::from(vec![
                Span::styled(format!("Could not create the recap: {error}"), error_style()),
                Span::styled("  (r)etry", italic_style()),
            ]))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .render(middle, buf);
        } else if engine.is_finished() {
            Paragraph::new(Span::styled(
                "Creating your recap and quiz...",
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::ITALIC),
            ))
            .alignment(Alignment::Center)
            .render(middle, buf);
        } else if let Some(word) = engine.current_word() {
            Paragraph::new(Span::styled(
                fit_width(word, usize::from(middle.width)),
                bold_style(),
            ))
            .alignment(Alignment::Center)
            .render(middle, buf);
        }

        let state = if engine.is_finished() {
            "Finished"
        } else if engine.is_playing() {
            "Playing"
        } else {
            "Paused"
        };
        Paragraph::new(Span::styled(
            format!("{} ms per word / {}", engine.delay_ms(), state),
            dim_style(),
        ))
        .render(chunks[4], buf);

        let toggle = if engine.is_playing() { "pause" } else { "resume" };
        legend(&[
            ("space", toggle),
            ("↑", "faster"),
            ("↓", "slower"),
            ("esc", "quit"),
        ])
        .render(chunks[5], buf);
    }
}

pub struct RecapScreen;

impl Screen for RecapScreen {
    fn render(&self, session: &Session, now: Instant, area: Rect, buf: &mut Buffer) {
        let chunks = Layout::vertical([
            Constraint::Min(3),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(area);

        let summary = if session.recap().trim().is_empty() {
            "No recap was returned for this text."
        } else {
            session.recap()
        };
        Paragraph::new(summary.to_string())
            .block(Block::default().borders(Borders::ALL).title("Recap"))
            .wrap(Wrap { trim: true })
            .render(chunks[0], buf);

        if let Some(engine) = session.pacing() {
            Paragraph::new(Span::styled(
                format!(
                    "{} words read at {:.0} wpm",
                    engine.index(),
                    engine.reading_wpm(now)
                ),
                bold_style(),
            ))
            .render(chunks[1], buf);
        }

        legend(&[("enter", "start quiz"), ("esc", "quit")]).render(chunks[2], buf);
    }
}

/// Flashcards, then the graded report
pub struct QuizScreen;

impl QuizScreen {
    /// Position line, card, swipe hint, legend.
    pub(super) fn card_layout(area: Rect) -> [Rect; 4] {
        Layout::vertical([
            Constraint::Length(1),
            Constraint::Min(5),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .areas(area)
    }

    fn render_card(runner: &QuizRunner, area: Rect, buf: &mut Buffer) {
        let total = runner.questions().len();
        let chunks = Self::card_layout(area);

        let header =
            Layout::horizontal([Constraint::Fill(1), Constraint::Fill(1)]).split(chunks[0]);
        Paragraph::new(Span::styled(
            format!("Question {} of {}", (runner.view_index() + 1).min(total), total),
            bold_style(),
        ))
        .render(header[0], buf);
        Paragraph::new(Span::styled(
            format!("{}% complete", runner.answers().len() * 100 / total.max(1)),
            dim_style(),
        ))
        .alignment(Alignment::Right)
        .render(header[1], buf);

        let Some(question) = runner.current() else {
            return;
        };
        let mut lines = vec![
            Line::from(Span::styled(question.text.clone(), bold_style())),
            Line::default(),
        ];
        let mut keys = vec![("←/→", "review")];
        if let Some(record) = runner.reviewed_answer() {
            lines.push(Line::from(Span::styled(
                format!("Your answer: {}", record.user_answer),
                italic_style(),
            )));
        } else {
            match question.kind {
                QuestionKind::YesNo => {
                    lines.push(Line::from("(y) Yes    (n) No    (d) Don't know"));
                }
                QuestionKind::FreeText => {
                    lines.push(Line::from(vec![
                        Span::raw("> "),
                        Span::raw(runner.draft().to_string()),
                        Span::styled("▏", dim_style()),
                    ]));
                    keys.push(if runner.can_submit_text() {
                        ("enter", "submit")
                    } else {
                        ("enter", "submit (type an answer first)")
                    });
                }
            }
            keys.push(("tab", DONT_KNOW));
        }
        let card_style = if runner.is_flipping() {
            dim_style()
        } else {
            Style::default()
        };
        Paragraph::new(lines)
            .style(card_style)
            .block(Block::default().borders(Borders::ALL).title("Flashcard"))
            .wrap(Wrap { trim: true })
            .render(chunks[1], buf);

        Paragraph::new(Span::styled(
            format!("Drag left on the card for \"{DONT_KNOW}\""),
            dim_style(),
        ))
        .render(chunks[2], buf);
        keys.push(("esc", "quit"));
        legend(&keys).render(chunks[3], buf);
    }

    fn render_report(runner: &QuizRunner, area: Rect, buf: &mut Buffer) {
        let chunks = Layout::vertical([
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(1),
        ])
        .split(area);

        if let Some((correct, total)) = runner.score() {
            let mut spans = vec![Span::styled(
                format!("Score: {correct} / {total}"),
                bold_style(),
            )];
            let ungraded = runner.ungraded();
            if ungraded > 0 {
                spans.push(Span::styled(format!("  ({ungraded} ungraded)"), dim_style()));
            }
            Paragraph::new(Line::from(spans)).render(chunks[0], buf);
        }

        let lines = runner
            .answers()
            .iter()
            .map(|record| {
                let (mark, style) = match record.correct {
                    Some(true) => ("✓", Style::default().fg(Color::Green)),
                    Some(false) => ("✗", Style::default().fg(Color::Red)),
                    None => ("?", Style::default().fg(Color::DarkGray)),
                };
                Line::from(vec![
                    Span::styled(format!("{mark} "), style.add_modifier(Modifier::BOLD)),
                    Span::raw(format!("{}: ", record.question)),
                    Span::styled(record.user_answer.clone(), italic_style()),
                ])
            })
            .collect::<Vec<_>>();
        Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Results"))
            .wrap(Wrap { trim: true })
            .render(chunks[1], buf);

        legend(&[("enter", "finish"), ("esc", "quit")]).render(chunks[2], buf);
    }
}

impl Screen for QuizScreen {
    fn render(&self, session: &Session, _now: Instant, area: Rect, buf: &mut Buffer) {
        let Some(runner) = session.runner() else {
            return;
        };

        if runner.is_empty() {
            let chunks = Layout::vertical([Constraint::Length(1); 3]).split(centered_rows(area, 3));
            Paragraph::new(Span::styled("No questions found", bold_style()))
                .alignment(Alignment::Center)
                .render(chunks[0], buf);
            legend(&[("enter", "finish")])
                .alignment(Alignment::Center)
                .render(chunks[2], buf);
            return;
        }

        match runner.status() {
            QuizStatus::Answering => Self::render_card(runner, area, buf),
            QuizStatus::Grading => {
                Paragraph::new(Span::styled(
                    "Grading your answers...",
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::ITALIC),
                ))
                .alignment(Alignment::Center)
                .render(centered_rows(area, 1), buf);
            }
            QuizStatus::Graded(_) => Self::render_report(runner, area, buf),
            QuizStatus::GradingFailed(message) => {
                let chunks =
                    Layout::vertical([Constraint::Length(1); 3]).split(centered_rows(area, 3));
                Paragraph::new(Span::styled(
                    format!("Grading failed: {message}"),
                    error_style(),
                ))
                    .alignment(Alignment::Center)
                    .render(chunks[0], buf);
                legend(&[("r", "retry"), ("enter", "finish")])
                    .alignment(Alignment::Center)
                    .render(chunks[2], buf);
            }
        }
    }
}

/// Helper to construct the appropriate screen for the current phase
pub fn current_screen(phase: Phase) -> Box<dyn Screen> {
    match phase {
        Phase::Input => Box::new(InputScreen),
        Phase::Confirm => Box::new(ConfirmScreen),
        Phase::Countdown => Box::new(CountdownScreen),
        Phase::Go => Box::new(GoScreen),
        Phase::Reading => Box::new(ReadingScreen),
        Phase::Recap => Box::new(RecapScreen),
        Phase::Quiz => Box::new(QuizScreen),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{GenerateResponse, GradeResponse, GradedAnswer, Question};
    use crate::ui::View;
    use ratatui::{backend::TestBackend, Terminal};
    use std::time::Duration;

    fn render(session: &Session, now: Instant) -> String {
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        let view = View::new(session, now);
        terminal
            .draw(|f| f.render_widget(&view, f.area()))
            .unwrap();
        let buffer = terminal.backend().buffer();
        buffer.content.iter().map(|c| c.symbol()).collect()
    }

    /// A session in Reading, started at the returned instant.
    fn reading(text: &str, t0: Instant) -> (Session, Instant) {
        let mut session = Session::default();
        session.input_str(text);
        session.submit();
        session.confirm(t0);
        for s in 1..=4 {
            session.on_tick(t0 + Duration::from_secs(s));
        }
        (session, t0 + Duration::from_secs(4))
    }

    fn recap(questions: Vec<Question>) -> (Session, Instant) {
        let t0 = Instant::now();
        let (mut session, start) = reading("hi", t0);
        session.on_tick(start + Duration::from_secs(1));
        session.apply_generation(
            1,
            Ok(GenerateResponse {
                summary: "A greeting.".into(),
                questions,
            }),
        );
        (session, start + Duration::from_secs(2))
    }

    fn quiz(questions: Vec<Question>) -> (Session, Instant) {
        let (mut session, now) = recap(questions);
        session.start_quiz();
        (session, now)
    }

    #[test]
    fn input_shows_word_count() {
        let mut session = Session::default();
        session.input_str("The quick brown fox");
        let content = render(&session, Instant::now());
        assert!(content.contains("4 words"));
        assert!(content.contains("The quick brown fox"));
    }

    #[test]
    fn confirm_and_countdown_screens() {
        let t0 = Instant::now();
        let mut session = Session::default();
        session.input_str("one two three");
        session.submit();
        assert!(render(&session, t0).contains("Ready to read 3 words"));

        session.confirm(t0);
        assert!(render(&session, t0).contains('3'));
        for s in 1..=3 {
            session.on_tick(t0 + Duration::from_secs(s));
        }
        assert!(render(&session, t0).contains("GO!"));
    }

    #[test]
    fn reading_shows_position_and_time() {
        let t0 = Instant::now();
        let (session, start) = reading("alpha beta gamma", t0);
        let content = render(&session, start);
        assert!(content.contains("Word 1 of 3"));
        assert!(content.contains("120s left"));
        assert!(content.contains("alpha"));
        assert!(content.contains("400 ms per word"));
        assert!(content.contains("(space) pause"));
    }

    #[test]
    fn reading_shows_loading_then_error() {
        let t0 = Instant::now();
        let (mut session, start) = reading("hi", t0);
        session.on_tick(start + Duration::from_secs(1));
        assert!(render(&session, start).contains("Creating your recap"));

        session.apply_generation(1, Err("connection refused".into()));
        let content = render(&session, start);
        assert!(content.contains("connection refused"));
        assert!(content.contains("(r)etry"));
    }

    #[test]
    fn recap_shows_summary() {
        let (session, now) = recap(Vec::new());
        let content = render(&session, now);
        assert!(content.contains("A greeting."));
        assert!(content.contains("1 words read"));
        assert!(content.contains("(enter) start quiz"));
    }

    #[test]
    fn empty_quiz_says_so_and_finishes() {
        let (mut session, now) = quiz(Vec::new());
        assert!(render(&session, now).contains("No questions found"));
        session.finish_quiz();
        assert!(render(&session, now).contains("Quiz completed! Great job!"));
    }

    #[test]
    fn quiz_card_and_report() {
        let (mut session, now) = quiz(vec![Question::yes_no("Is fox brown?")]);
        let content = render(&session, now);
        assert!(content.contains("Question 1 of 1"));
        assert!(content.contains("0% complete"));
        assert!(content.contains("Is fox brown?"));

        session.runner_mut().unwrap().answer_yes(now);
        session.on_tick(now + Duration::from_millis(300));
        assert!(render(&session, now).contains("Grading your answers"));

        session.apply_grading(
            1,
            Ok(GradeResponse {
                graded_answers: vec![GradedAnswer {
                    question: "Is fox brown?".into(),
                    answer: "Yes".into(),
                    correct: true,
                }],
            }),
        );
        let content = render(&session, now);
        assert!(content.contains("Score: 1 / 1"));
        assert!(content.contains("✓"));
    }

    #[test]
    fn report_marks_missing_verdicts_as_ungraded() {
        let (mut session, now) = quiz(vec![
            Question::yes_no("Is fox brown?"),
            Question::yes_no("Is dog lazy?"),
        ]);
        session.runner_mut().unwrap().answer_yes(now);
        session.on_tick(now + Duration::from_millis(300));
        session.runner_mut().unwrap().answer_yes(now + Duration::from_millis(300));
        session.on_tick(now + Duration::from_millis(600));
        session.apply_grading(1, Ok(GradeResponse::default()));

        let content = render(&session, now);
        assert!(content.contains("Score: 0 / 0"));
        assert!(content.contains("(2 ungraded)"));
        assert!(content.contains("? Is fox brown?"));
        assert!(!content.contains("✗"));
    }

    #[test]
    fn grading_failure_offers_retry() {
        let (mut session, now) = quiz(vec![Question::free_text("What?")]);
        session.runner_mut().unwrap().dont_know(now);
        session.on_tick(now + Duration::from_millis(300));
        session.apply_grading(1, Err("timeout".into()));
        let content = render(&session, now);
        assert!(content.contains("Grading failed: timeout"));
        assert!(content.contains("(r) retry"));
    }
}
