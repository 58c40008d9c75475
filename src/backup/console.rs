//! Operator-facing terminal context: progress drawing and yes/no questions.
//!
//! A [`Console`] is created once by the caller and handed to the runner, so
//! tests can script answers and swallow output.

use std::io::{self, BufRead, BufReader, Write};
use tracing::trace;

const BAR_WIDTH: u64 = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    Other,
}

impl Answer {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.eq_ignore_ascii_case("yes") {
            Answer::Yes
        } else if line.eq_ignore_ascii_case("no") {
            Answer::No
        } else {
            Answer::Other
        }
    }
}

pub struct Console {
    out: Box<dyn Write>,
    input: Box<dyn BufRead>,
}

impl Console {
    pub fn new<W: Write + 'static, R: BufRead + 'static>(out: W, input: R) -> Self {
        Self {
            out: Box::new(out),
            input: Box::new(input),
        }
    }

    pub fn stdio() -> Self {
        Self::new(io::stdout(), BufReader::new(io::stdin()))
    }

    /// Prints `question` and reads one line. End of input counts as [`Answer::Other`].
    pub fn ask(&mut self, question: &str) -> io::Result<Answer> {
        write!(self.out, "{question} ")?;
        self.out.flush()?;
        let mut line = String::new();
        self.input.read_line(&mut line)?;
        writeln!(self.out)?;
        Ok(Answer::parse(&line))
    }

    pub fn draw_progress(&mut self, percent: u64) {
        let res = write!(self.out, "\r{}", render_bar(percent)).and_then(|_| self.out.flush());
        if let Err(e) = res {
            trace!("Drawing progress failed: {e}");
        }
    }

    pub fn end_progress(&mut self) {
        if let Err(e) = writeln!(self.out) {
            trace!("Drawing progress failed: {e}");
        }
    }
}

pub fn render_bar(percent: u64) -> String {
    let percent = percent.min(100);
    let done = (percent * BAR_WIDTH / 100) as usize;
    let todo = BAR_WIDTH as usize - done;
    format!("[{}{}] {percent:>3}%", "■".repeat(done), ".".repeat(todo))
}

/// Counts processed entries against a known total and reports when the
/// integer percentage grows, so a redraw happens at most 101 times.
#[derive(Debug)]
pub struct ProgressBar {
    total: u64,
    processed: u64,
    last_percent: Option<u64>,
}

impl ProgressBar {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            processed: 0,
            last_percent: None,
        }
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Records one entry. Returns the new percentage when it should be redrawn.
    pub fn advance(&mut self) -> Option<u64> {
        self.processed += 1;
        if self.total == 0 {
            return None;
        }
        let percent = (self.processed.saturating_mul(100) / self.total).min(100);
        match self.last_percent {
            Some(last) if percent <= last => None,
            _ => {
                self.last_percent = Some(percent);
                Some(percent)
            }
        }
    }
}
