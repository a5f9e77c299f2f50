//! Keyboard input and plain-text display for running a block in a terminal.
//!
//! A response is a line starting with `f` (left) or `j` (right). A reader
//! thread stamps each line with the block clock as it arrives; lines typed
//! before a prompt's onset are discarded. The deadline is applied with a
//! current-thread tokio runtime, so the engine still sees a plain blocking call.

use std::io::{self, BufRead, Stdout, Write};
use std::thread;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{trace, warn};

use crate::clock::{Clock, SystemClock};
use crate::sequencer::{ChoiceEvent, ChoicePrompt, ChoiceSource, Presenter, Screen, Side, Stage};

/// One line of input and when it was read.
#[derive(Debug)]
struct Keypress {
    timestamp: f64,
    line: String,
}

impl Keypress {
    /// The response this line gives to a prompt shown at `onset`, if any.
    fn response(&self, onset: f64) -> Option<ChoiceEvent> {
        if self.timestamp < onset {
            trace!(line = %self.line, "dropping input typed before the prompt");
            return None;
        }
        let side = self.line.trim().chars().next().and_then(Side::from_key)?;
        Some(ChoiceEvent {
            side,
            timestamp: self.timestamp,
        })
    }
}

fn forward_lines<B: BufRead>(input: B, clock: SystemClock, tx: UnboundedSender<io::Result<Keypress>>) {
    for line in input.lines() {
        let msg = line.map(|line| Keypress {
            timestamp: clock.now(),
            line,
        });
        let failed = msg.is_err();
        if tx.send(msg).is_err() || failed {
            break;
        }
    }
}

pub struct TerminalInput {
    runtime: Runtime,
    lines: UnboundedReceiver<io::Result<Keypress>>,
    closed: bool,
}

impl TerminalInput {
    /// Reads responses from stdin.
    ///
    /// `clock` must be a copy of the clock driving the block so timestamps share its epoch.
    pub fn new(clock: SystemClock) -> io::Result<Self> {
        Self::from_reader(io::BufReader::new(io::stdin()), clock)
    }

    pub fn from_reader<B>(input: B, clock: SystemClock) -> io::Result<Self>
    where
        B: BufRead + Send + 'static,
    {
        let runtime = Builder::new_current_thread().enable_time().build()?;
        let (tx, lines) = mpsc::unbounded_channel();
        thread::Builder::new()
            .name("twostep-input".to_string())
            .spawn(move || forward_lines(input, clock, tx))?;
        Ok(Self {
            runtime,
            lines,
            closed: false,
        })
    }
}

impl ChoiceSource for TerminalInput {
    fn collect_choice(&mut self, prompt: &ChoicePrompt, deadline: Duration) -> Option<ChoiceEvent> {
        if self.closed {
            return None;
        }
        let Self {
            runtime,
            lines,
            closed,
        } = self;

        runtime.block_on(async {
            let until = tokio::time::Instant::now() + deadline;
            loop {
                match tokio::time::timeout_at(until, lines.recv()).await {
                    Err(_) => return None,
                    Ok(Some(Ok(press))) => {
                        if let Some(event) = press.response(prompt.onset) {
                            return Some(event);
                        }
                    }
                    Ok(Some(Err(e))) => {
                        warn!(error = %e, "stdin read failed");
                        *closed = true;
                        return None;
                    }
                    Ok(None) => {
                        *closed = true;
                        return None;
                    }
                }
            }
        })
    }

    fn exhausted(&self) -> bool {
        self.closed
    }
}

/// Display label for an option: stage one is A/B, state 0 is C/D, state 1 is E/F.
pub fn option_label(state: Option<usize>, option: usize) -> char {
    let base = match state {
        None => b'A',
        Some(s) => b'C' + 2 * s as u8,
    };
    (base + option as u8) as char
}

pub struct TextPresenter {
    out: Stdout,
}

impl TextPresenter {
    pub fn new() -> Self {
        Self { out: io::stdout() }
    }

    fn render(screen: &Screen) -> String {
        match screen {
            Screen::Fixation => "\n      +".to_string(),
            Screen::Choice(p) => {
                let left = option_label(p.state, p.layout.option_at(Side::Left));
                let right = option_label(p.state, p.layout.option_at(Side::Right));
                let stage = match p.stage {
                    Stage::One => "step 1",
                    Stage::Two => "step 2",
                };
                format!("[{stage}]   (f) {left}      (j) {right}")
            }
            Screen::Selected { side, .. } => format!("   chose {}", side.key()),
            Screen::Transition { state, .. } => format!("   -> planet {}", state + 1),
            Screen::Outcome { rewarded: true, .. } => "   * reward *".to_string(),
            Screen::Outcome { rewarded: false, .. } => "   no reward".to_string(),
            Screen::TooSlow { .. } => "   Too slow! Please respond faster.".to_string(),
        }
    }
}

impl Default for TextPresenter {
    fn default() -> Self {
        Self::new()
    }
}

impl Presenter for TextPresenter {
    fn present(&mut self, screen: &Screen) {
        let mut out = self.out.lock();
        let _ = writeln!(out, "{}", Self::render(screen));
        let _ = out.flush();
    }
}
