pub mod screen;

use std::time::Instant;

use itertools::Itertools;
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::Span,
    widgets::{Paragraph, Widget},
    Frame,
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::app::App;
use crate::session::Session;

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;

/// Draws the screen for the session's current phase.
pub fn draw(f: &mut Frame, app: &App, now: Instant) {
    let view = View::new(app.session(), now);
    f.render_widget(&view, f.area());
}

/// A session as seen at one instant.
pub struct View<'a> {
    session: &'a Session,
    now: Instant,
}

impl<'a> View<'a> {
    pub fn new(session: &'a Session, now: Instant) -> Self {
        Self { session, now }
    }
}

impl Widget for &View<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        screen::current_screen(self.session.phase()).render(
            self.session,
            self.now,
            inner_area(area),
            buf,
        );
    }
}

/// Where the quiz flashcard lands in a frame of size `area`.
pub fn card_area(area: Rect) -> Rect {
    screen::QuizScreen::card_layout(inner_area(area))[1]
}

fn inner_area(area: Rect) -> Rect {
    Layout::default()
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([Constraint::Min(0)])
        .split(area)[0]
}

fn bold_style() -> Style {
    Style::default().add_modifier(Modifier::BOLD)
}

fn dim_style() -> Style {
    Style::default().add_modifier(Modifier::DIM)
}

fn italic_style() -> Style {
    Style::default().add_modifier(Modifier::ITALIC)
}

fn error_style() -> Style {
    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
}

/// The `height` rows in the vertical middle of `area`.
fn centered_rows(area: Rect, height: u16) -> Rect {
    Layout::vertical([
        Constraint::Fill(1),
        Constraint::Length(height),
        Constraint::Fill(1),
    ])
    .split(area)[1]
}

/// `(key) action / (key) action` hint line.
fn legend(keys: &[(&str, &str)]) -> Paragraph<'static> {
    Paragraph::new(Span::styled(legend_text(keys), italic_style()))
}

fn legend_text(keys: &[(&str, &str)]) -> String {
    keys.iter()
        .map(|(key, action)| format!("({key}) {action}"))
        .join(" / ")
}

/// Cuts `text` to at most `max_width` terminal columns, marking the cut.
fn fit_width(text: &str, max_width: usize) -> String {
    if text.width() <= max_width {
        return text.to_string();
    }
    let mut width = 0;
    let mut out = String::new();
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if width + w > max_width.saturating_sub(1) {
            out.push('…');
            return out;
        }
        width += w;
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::{backend::TestBackend, Terminal};

    #[test]
    fn legend_joins_hints() {
        assert_eq!(
            legend_text(&[("enter", "start"), ("esc", "quit")]),
            "(enter) start / (esc) quit"
        );
    }

    #[test]
    fn fit_width_counts_columns() {
        assert_eq!(fit_width("short", 10), "short");
        assert_eq!(fit_width("exact", 5), "exact");
        assert_eq!(fit_width("abcdefghij", 5), "abcd…");
        // wide glyphs take two columns each
        assert_eq!(fit_width("日本語テキスト", 6), "日本…");
    }

    #[test]
    fn card_area_sits_inside_the_margins() {
        let card = card_area(Rect::new(0, 0, 80, 24));
        // margins, then one row for the position line
        assert_eq!(card.x, HORIZONTAL_MARGIN);
        assert_eq!(card.y, VERTICAL_MARGIN + 1);
        assert_eq!(card.width, 80 - 2 * HORIZONTAL_MARGIN);
        assert_eq!(card.height, 24 - 2 * VERTICAL_MARGIN - 3);
    }

    #[test]
    fn view_renders_in_tiny_areas() {
        let session = Session::default();
        let view = View::new(&session, Instant::now());
        for (w, h) in [(1, 1), (8, 3), (200, 60)] {
            let mut terminal = Terminal::new(TestBackend::new(w, h)).unwrap();
            terminal.draw(|f| f.render_widget(&view, f.area())).unwrap();
        }
    }
}
