use std::{
    error::Error,
    fs,
    io::{self, stdin},
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
    time::Instant,
};

use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand};
use crossterm::{
    event::{DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};

use flashread::{
    app::{App, Flow},
    app_dirs::AppDirs,
    backend::{HttpBackend, OpenAiBackend, OpenAiConfig, StudyBackend},
    config::{Config, ConfigStore, FileConfigStore},
    cue::{Cue, Silent, TerminalBell},
    logging,
    pacing::{MAX_DELAY_MS, MIN_DELAY_MS},
    runtime::{CrosstermEventSource, EventSource, FixedTicker, Runner, Ticker},
    server, ui,
};

/// speed-reading tui: one word at a time, then an ai recap and a graded quiz
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Shows a text one word at a time at a pace you control, then asks a \
                  language model for a short recap and a few flashcard questions, and \
                  grades your answers."
)]
pub struct Cli {
    /// text to read; otherwise type or paste it in the app
    #[clap(short = 'p', long, conflicts_with = "file")]
    prompt: Option<String>,

    /// read the text from a file
    #[clap(short = 'f', long)]
    file: Option<PathBuf>,

    /// milliseconds each word stays on screen (short words get half)
    #[clap(
        short = 'd',
        long,
        value_parser = clap::value_parser!(u64).range(MIN_DELAY_MS..=MAX_DELAY_MS)
    )]
    delay_ms: Option<u64>,

    /// use a `flashread serve` instance instead of calling the model directly
    #[clap(long)]
    backend_url: Option<String>,

    /// no countdown beeps
    #[clap(long)]
    mute: bool,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// serve POST /generate and POST /grade for other clients
    Serve {
        /// address to listen on
        #[clap(long, default_value = "127.0.0.1:8787")]
        addr: SocketAddr,
    },
}

impl Cli {
    /// Command line flags win over the saved config.
    fn apply_to(&self, config: &mut Config) {
        if let Some(delay_ms) = self.delay_ms {
            config.delay_ms = delay_ms;
        }
        if self.mute {
            config.mute = true;
        }
        if let Some(url) = &self.backend_url {
            config.backend_url = Some(url.clone());
        }
    }

    fn initial_text(&self) -> io::Result<Option<String>> {
        match (&self.prompt, &self.file) {
            (Some(prompt), _) => Ok(Some(prompt.clone())),
            (None, Some(path)) => fs::read_to_string(path).map(Some),
            (None, None) => Ok(None),
        }
    }
}

fn study_backend(config: &Config) -> Arc<dyn StudyBackend> {
    match &config.backend_url {
        Some(url) => {
            tracing::info!(%url, "using remote backend");
            Arc::new(HttpBackend::new(url.clone()))
        }
        None => {
            let ai = OpenAiConfig::from_env(&config.ai_base_url, &config.ai_model);
            if ai.is_none() {
                tracing::warn!("no api key set, recap and grading will fail");
            }
            Arc::new(OpenAiBackend::new(ai))
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let store = FileConfigStore::new();
    let mut config = store.load();
    cli.apply_to(&mut config);

    if let Some(Command::Serve { addr }) = &cli.command {
        logging::init_stderr();
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(server::serve(*addr, study_backend(&config)))?;
        return Ok(());
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let text = cli.initial_text()?;
    if let Some(path) = AppDirs::log_path() {
        if let Err(e) = logging::init_file(&path) {
            eprintln!("logging disabled: {e}");
        }
    }

    let rt = tokio::runtime::Runtime::new()?;
    let cue: Box<dyn Cue> = if config.mute {
        Box::new(Silent)
    } else {
        Box::new(TerminalBell::stdout())
    };

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(
        stdout,
        EnterAlternateScreen,
        EnableMouseCapture,
        EnableBracketedPaste
    )?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let events = CrosstermEventSource::new();
    let mut app = App::new(
        config.clone(),
        study_backend(&config),
        rt.handle().clone(),
        events.sender(),
        cue,
    )
    .with_store(Box::new(store));
    if let Some(text) = text {
        app = app.with_text(&text);
    }
    let runner = Runner::new(events, FixedTicker::default());

    let result = start_tui(&mut terminal, &mut app, &runner);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableBracketedPaste,
        DisableMouseCapture,
        LeaveAlternateScreen,
    )?;
    terminal.show_cursor()?;

    result
}

fn start_tui<B: Backend, E: EventSource, T: Ticker>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    runner: &Runner<E, T>,
) -> Result<(), Box<dyn Error>> {
    let frame = terminal.draw(|f| ui::draw(f, app, Instant::now()))?;
    app.set_viewport(frame.area);

    loop {
        let event = runner.step();
        let now = Instant::now();
        match app.handle_event(event, now) {
            Flow::Quit => break,
            Flow::Redraw => {
                let frame = terminal.draw(|f| ui::draw(f, app, now))?;
                app.set_viewport(frame.area);
            }
            Flow::Continue => {}
        }
    }

    tracing::info!("bye");
    Ok(())
}
