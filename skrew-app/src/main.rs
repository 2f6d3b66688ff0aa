//! Skrew - instruction-driven beat remixer
//!
//! `skrew <file|url>` opens an interactive prompt; `skrew <file|url> "<instructions>"`
//! applies the instructions, saves and exits.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use crossterm::{
    cursor::MoveToColumn,
    event::{self, Event},
    execute,
    style::Print,
    terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use skrew_audio::{Dsp, NativeDsp, PlaybackEngine};
use skrew_input::{InputHandler, KeyAction};
use skrew_library::{is_url, Config, Downloader};
use skrew_session::{Flow, Notice, Outcome, Session, SessionOptions};

/// Key poll interval in key mode
const POLL: Duration = Duration::from_millis(100);

const PROMPT: &str = "> ";

#[derive(Parser, Debug)]
#[command(name = "skrew", version, about = "Instruction-driven beat remixer")]
struct Cli {
    /// Audio file, or an http(s) URL to download first
    input: String,

    /// Instructions to apply non-interactively, e.g. "loop:2:8:4;echo:0.5:3:0.7;"
    instructions: Option<String>,

    /// Config file (defaults to the per-user config)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Read keys in raw mode instead of whole lines
    #[arg(long)]
    keys: bool,

    /// Do not open an audio output device
    #[arg(long)]
    no_audio: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.keys && cli.instructions.is_none());

    let config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => Config::load(),
    };
    let path = resolve_input(&cli.input, &config)?;

    let headless = cli.no_audio || cli.instructions.is_some();
    let mut repl = Repl {
        dsp: Arc::new(NativeDsp::new()),
        options: SessionOptions::from(&config),
        block_size: config.block_size,
        headless,
        raw: false,
        awaiting_path: false,
        session: None,
    };
    repl.open(&path)?;

    match &cli.instructions {
        Some(instructions) => repl.batch(instructions),
        None if cli.keys => run_keys(repl),
        None => run_lines(repl),
    }
}

/// Logs go to stderr so stdout only carries user messages
fn init_logging(raw: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(move || TerminalWriter { raw })
        .init();
}

/// Stderr writer; in raw mode bare newlines do not return the cursor
struct TerminalWriter {
    raw: bool,
}

impl Write for TerminalWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut err = io::stderr().lock();
        if self.raw {
            for chunk in buf.split_inclusive(|&b| b == b'\n') {
                match chunk.strip_suffix(b"\n") {
                    Some(line) => {
                        err.write_all(line)?;
                        err.write_all(b"\r\n")?;
                    }
                    None => err.write_all(chunk)?,
                }
            }
        } else {
            err.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

/// Download URLs, pass paths through
fn resolve_input(input: &str, config: &Config) -> anyhow::Result<PathBuf> {
    if !is_url(input) {
        return Ok(PathBuf::from(input));
    }
    info!(url = input, "downloading");
    let downloader = Downloader::new(&config.downloader_path, &config.download_dir);
    let path = downloader
        .fetch(input)
        .with_context(|| format!("failed to download {input}"))?;
    Ok(path)
}

/// Interactive state shared by line and key mode
struct Repl {
    dsp: Arc<dyn Dsp>,
    options: SessionOptions,
    block_size: usize,
    headless: bool,
    /// Terminal is in raw mode
    raw: bool,
    /// Next submitted line is a file path (after `l;`)
    awaiting_path: bool,
    session: Option<Session>,
}

impl Repl {
    fn open(&mut self, path: &Path) -> anyhow::Result<()> {
        let playback = if self.headless {
            PlaybackEngine::headless()
        } else {
            PlaybackEngine::new(self.block_size)
        };
        let session = Session::open(path, self.options.clone(), Arc::clone(&self.dsp), playback)
            .with_context(|| format!("failed to open {}", path.display()))?;
        self.say(&format!("Loaded {}", path.display()));
        self.session = Some(session);
        Ok(())
    }

    fn batch(&mut self, instructions: &str) -> anyhow::Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let mut text = instructions.trim().to_string();
        if !text.ends_with(';') {
            text.push(';');
        }
        let outcome = session.handle_input(&text);
        let saved = session.save();
        self.show(&outcome.notices);
        let saved = saved.context("failed to save result")?;
        self.show(&saved);
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        Ok(())
    }

    /// Run one submitted line; false once the user quits
    fn submit(&mut self, line: &str) -> bool {
        if self.awaiting_path {
            self.awaiting_path = false;
            let path = PathBuf::from(line.trim());
            if let Err(e) = self.open(&path) {
                warn!(error = %e, "load failed");
                self.show(&[Notice::error(format!("{e:#}"))]);
            }
            return true;
        }
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let outcome = session.handle_input(line);
        self.finish(outcome)
    }

    fn finish(&mut self, outcome: Outcome) -> bool {
        self.show(&outcome.notices);
        match outcome.flow {
            Flow::Continue => true,
            Flow::Quit => false,
            Flow::LoadRequested => {
                self.awaiting_path = true;
                self.say("Enter the path of the file to load:");
                true
            }
        }
    }

    fn show(&self, notices: &[Notice]) {
        for notice in notices {
            self.say(&notice.to_string());
        }
    }

    fn say(&self, text: &str) {
        let mut out = io::stdout().lock();
        let result = if self.raw {
            write!(out, "{}\r\n", text.replace('\n', "\r\n"))
        } else {
            writeln!(out, "{text}")
        };
        if let Err(e) = result.and_then(|_| out.flush()) {
            warn!(error = %e, "stdout write failed");
        }
    }
}

fn run_lines(mut repl: Repl) -> anyhow::Result<()> {
    repl.say("Type h; for help, q; to quit.");
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("{PROMPT}");
        io::stdout().flush()?;
        let Some(line) = lines.next() else {
            break;
        };
        if !repl.submit(&line?) {
            break;
        }
    }
    if let Some(mut session) = repl.session.take() {
        session.close();
    }
    Ok(())
}

fn run_keys(mut repl: Repl) -> anyhow::Result<()> {
    enable_raw_mode()?;
    repl.raw = true;
    let result = key_loop(&mut repl);
    if let Some(mut session) = repl.session.take() {
        session.close();
    }
    disable_raw_mode()?;
    println!();
    result
}

fn key_loop(repl: &mut Repl) -> anyhow::Result<()> {
    let mut input = InputHandler::new();
    repl.say("Type h; and Enter for help. Space plays, Left/Right undo/redo, Up restarts, Ctrl-C quits.");
    redraw(input.line())?;

    loop {
        if !event::poll(POLL)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        let Some(action) = input.handle_key(key) else {
            continue;
        };

        clear_line()?;
        let keep_going = match action {
            KeyAction::Submit(line) => {
                repl.say(&format!("{PROMPT}{line}"));
                repl.submit(&line)
            }
            KeyAction::Control(control) => match repl.session.as_mut() {
                Some(session) => {
                    let outcome = session.control(control);
                    repl.finish(outcome)
                }
                None => false,
            },
            KeyAction::Restart => {
                if let Some(session) = repl.session.as_mut() {
                    if let Err(e) = session.restart_playback() {
                        repl.show(&[Notice::error(e.to_string())]);
                    }
                }
                true
            }
            KeyAction::Edited => true,
        };
        if !keep_going {
            return Ok(());
        }
        redraw(input.line())?;
    }
}

fn clear_line() -> io::Result<()> {
    execute!(io::stdout(), MoveToColumn(0), Clear(ClearType::CurrentLine))
}

fn redraw(line: &str) -> io::Result<()> {
    execute!(
        io::stdout(),
        MoveToColumn(0),
        Clear(ClearType::CurrentLine),
        Print(PROMPT),
        Print(line)
    )
}
