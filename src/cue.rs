use std::io::{self, Write};

/// Audible cues played during the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum CueKind {
    /// One per countdown number.
    Beep,
    /// When "GO!" appears.
    Go,
}

/// Something that can make a sound. Failures are never fatal.
pub trait Cue: Send {
    fn play(&mut self, kind: CueKind);
}

/// Rings the terminal bell; twice for [`CueKind::Go`].
pub struct TerminalBell<W: Write + Send> {
    out: W,
}

impl TerminalBell<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write + Send> TerminalBell<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> Cue for TerminalBell<W> {
    fn play(&mut self, kind: CueKind) {
        let bells: &[u8] = match kind {
            CueKind::Beep => b"\x07",
            CueKind::Go => b"\x07\x07",
        };
        if let Err(e) = self.out.write_all(bells).and_then(|_| self.out.flush()) {
            tracing::debug!(%kind, "could not play cue: {}", e);
        }
    }
}

/// Used with `--mute` and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl Cue for Silent {
    fn play(&mut self, kind: CueKind) {
        tracing::trace!(%kind, "cue muted");
    }
}
