use crate::batch::{BatchResult, RenderedMove};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Why a source was left where it is.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The template rendered an empty destination.
    EmptyDestination,
    /// Something already occupies the destination.
    Collision,
}

/// Receives per-file notices and the final tally from a batch run.
pub trait Reporter {
    /// Called once per rendered move, before the filesystem is touched.
    fn report_move(&mut self, rendered: &RenderedMove) -> io::Result<()>;

    fn report_skip(&mut self, source: &str, reason: SkipReason) -> io::Result<()>;

    /// Called exactly once, also when the batch stops on an error.
    fn finish(&mut self, result: &BatchResult) -> io::Result<()>;
}

impl<R: Reporter + ?Sized> Reporter for Box<R> {
    fn report_move(&mut self, rendered: &RenderedMove) -> io::Result<()> {
        (**self).report_move(rendered)
    }

    fn report_skip(&mut self, source: &str, reason: SkipReason) -> io::Result<()> {
        (**self).report_skip(source, reason)
    }

    fn finish(&mut self, result: &BatchResult) -> io::Result<()> {
        (**self).finish(result)
    }
}

/// Picks the reporter for the resolved output options.
pub fn reporter_for(silent: bool, format: OutputFormat) -> Box<dyn Reporter> {
    match (silent, format) {
        (true, _) => Box::new(SilentReporter),
        (false, OutputFormat::Text) => Box::new(TextReporter::new(io::stdout(), io::stderr())),
        (false, OutputFormat::Json) => Box::new(JsonReporter::new(io::stdout())),
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl Reporter for SilentReporter {
    fn report_move(&mut self, _rendered: &RenderedMove) -> io::Result<()> {
        Ok(())
    }

    fn report_skip(&mut self, _source: &str, _reason: SkipReason) -> io::Result<()> {
        Ok(())
    }

    fn finish(&mut self, _result: &BatchResult) -> io::Result<()> {
        Ok(())
    }
}

/// Prints `mv "src" "dst"` lines to `out`; collisions and the summary go to `err`.
#[derive(Debug)]
pub struct TextReporter<W, E> {
    out: W,
    err: E,
}

impl<W: Write, E: Write> TextReporter<W, E> {
    pub fn new(out: W, err: E) -> Self {
        Self { out, err }
    }

    pub fn into_inner(self) -> (W, E) {
        (self.out, self.err)
    }
}

impl<W: Write, E: Write> Reporter for TextReporter<W, E> {
    fn report_move(&mut self, rendered: &RenderedMove) -> io::Result<()> {
        writeln!(
            self.out,
            "mv {:?} {:?}",
            rendered.source, rendered.destination
        )
    }

    fn report_skip(&mut self, source: &str, reason: SkipReason) -> io::Result<()> {
        match reason {
            SkipReason::Collision => {
                writeln!(self.err, "skipped {source:?}: destination already exists")
            }
            SkipReason::EmptyDestination => Ok(()),
        }
    }

    fn finish(&mut self, result: &BatchResult) -> io::Result<()> {
        self.out.flush()?;
        writeln!(self.err, "{}", result.summary())
    }
}

#[derive(Debug, Serialize)]
struct SkippedEntry {
    source: String,
    reason: SkipReason,
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    moves: &'a [RenderedMove],
    skipped: &'a [SkippedEntry],
    result: &'a BatchResult,
}

/// Buffers everything and writes one pretty-printed JSON document when the batch finishes.
#[derive(Debug)]
pub struct JsonReporter<W> {
    out: W,
    moves: Vec<RenderedMove>,
    skipped: Vec<SkippedEntry>,
}

impl<W: Write> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            moves: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn report_move(&mut self, rendered: &RenderedMove) -> io::Result<()> {
        self.moves.push(rendered.clone());
        Ok(())
    }

    fn report_skip(&mut self, source: &str, reason: SkipReason) -> io::Result<()> {
        self.skipped.push(SkippedEntry {
            source: source.to_string(),
            reason,
        });
        Ok(())
    }

    fn finish(&mut self, result: &BatchResult) -> io::Result<()> {
        let report = JsonReport {
            moves: &self.moves,
            skipped: &self.skipped,
            result,
        };
        serde_json::to_writer_pretty(&mut self.out, &report)?;
        writeln!(self.out)
    }
}
