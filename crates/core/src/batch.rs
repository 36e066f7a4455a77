use crate::context::{FileContext, MetadataError};
use crate::mover::{move_path, MoveError, MoveOutcome};
use crate::report::{Reporter, SkipReason};
use crate::template::{render_template, Template, TemplateError};
use serde::{Deserialize, Serialize};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("cannot read input paths: {0}")]
    ReadInput(#[source] io::Error),
    #[error(transparent)]
    Context(#[from] MetadataError),
    #[error("cannot build destination for {path:?}: {source}")]
    Render {
        path: String,
        #[source]
        source: TemplateError,
    },
    #[error(transparent)]
    Move(#[from] MoveError),
    #[error("cannot write report: {0}")]
    Report(#[source] io::Error),
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Separator {
    #[default]
    Newline,
    Null,
}

impl Separator {
    pub fn as_char(self) -> char {
        match self {
            Separator::Newline => '\n',
            Separator::Null => '\0',
        }
    }
}

/// Splits raw input on `separator`, dropping empty entries.
pub fn split_paths(input: &str, separator: Separator) -> Vec<&str> {
    input
        .split(separator.as_char())
        .filter(|path| !path.is_empty())
        .collect()
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub dryrun: bool,
    pub separator: Separator,
    /// Base for relative input paths and rendered destinations.
    pub working_dir: PathBuf,
}

/// One source with its rendered destination, handed to the reporter and the mover.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenderedMove {
    pub source: String,
    pub destination: String,
    pub index: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchResult {
    pub considered: usize,
    /// Files moved, or that would have been moved in a dry run.
    pub moved: usize,
    pub unchanged: usize,
    pub skipped_empty: usize,
    pub skipped_collision: usize,
    pub dryrun: bool,
}

impl BatchResult {
    pub fn new(dryrun: bool) -> Self {
        Self {
            dryrun,
            ..Self::default()
        }
    }

    pub fn skipped(&self) -> usize {
        self.skipped_empty + self.skipped_collision
    }

    pub fn summary(&self) -> String {
        let would = if self.dryrun { "would have " } else { "" };
        format!("{would}moved {} file(s)", self.moved)
    }
}

/// Drives one batch: render every input path, then move it, strictly in input order.
pub struct BatchRunner<R: Reporter> {
    template: Template,
    options: BatchOptions,
    reporter: R,
}

impl<R: Reporter> BatchRunner<R> {
    pub fn new(template: Template, options: BatchOptions, reporter: R) -> Self {
        Self {
            template,
            options,
            reporter,
        }
    }

    pub fn into_reporter(self) -> R {
        self.reporter
    }

    /// Reads the whole input before touching any file, then runs the batch.
    pub fn run_reader(&mut self, mut input: impl Read) -> Result<BatchResult, BatchError> {
        let mut raw = String::new();
        input
            .read_to_string(&mut raw)
            .map_err(BatchError::ReadInput)?;
        let paths = split_paths(&raw, self.options.separator);
        self.run(&paths)
    }

    /// Stops at the first render, resolution or move error. Files already moved stay moved;
    /// the reporter still receives the partial tally.
    pub fn run(&mut self, paths: &[&str]) -> Result<BatchResult, BatchError> {
        let mut result = BatchResult::new(self.options.dryrun);
        debug!("got {} path(s)", paths.len());

        let outcome = self.process(paths, &mut result);
        let finished = self.reporter.finish(&result).map_err(BatchError::Report);
        info!("{}", result.summary());

        outcome?;
        finished?;
        Ok(result)
    }

    fn process(&mut self, paths: &[&str], result: &mut BatchResult) -> Result<(), BatchError> {
        let working_dir = self.options.working_dir.as_path();
        let mut index = 0usize;

        for raw in paths {
            result.considered += 1;
            debug!("building path for {raw:?}");

            let ctx = FileContext::resolve(index, raw, working_dir)?;
            let destination =
                render_template(&self.template, &ctx).map_err(|source| BatchError::Render {
                    path: raw.to_string(),
                    source,
                })?;

            if destination.is_empty() {
                debug!("skipping {raw:?}: rendered destination is empty");
                result.skipped_empty += 1;
                self.reporter
                    .report_skip(raw, SkipReason::EmptyDestination)
                    .map_err(BatchError::Report)?;
                continue;
            }

            let rendered = RenderedMove {
                source: raw.to_string(),
                destination,
                index,
            };
            index += 1;
            self.reporter
                .report_move(&rendered)
                .map_err(BatchError::Report)?;

            if self.options.dryrun {
                result.moved += 1;
                continue;
            }

            match self.execute(&rendered, working_dir)? {
                MoveOutcome::Moved => result.moved += 1,
                MoveOutcome::NoOp => result.unchanged += 1,
                MoveOutcome::Collision => {
                    result.skipped_collision += 1;
                    self.reporter
                        .report_skip(&rendered.source, SkipReason::Collision)
                        .map_err(BatchError::Report)?;
                }
            }
        }

        Ok(())
    }

    fn execute(
        &self,
        rendered: &RenderedMove,
        working_dir: &Path,
    ) -> Result<MoveOutcome, BatchError> {
        let outcome = move_path(
            Path::new(&rendered.source),
            Path::new(&rendered.destination),
            working_dir,
        )?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::{split_paths, BatchError, BatchOptions, BatchRunner, Separator};
    use crate::report::{SilentReporter, TextReporter};
    use crate::template::compile_template;
    use std::fs;
    use tempfile::tempdir;

    fn options(dir: &std::path::Path, dryrun: bool) -> BatchOptions {
        BatchOptions {
            dryrun,
            separator: Separator::Newline,
            working_dir: dir.to_path_buf(),
        }
    }

    #[test]
    fn split_drops_empty_entries() {
        assert_eq!(split_paths("a\nb\n\nc", Separator::Newline), vec!["a", "b", "c"]);
        assert_eq!(split_paths("a\0b\0\0", Separator::Null), vec!["a", "b"]);
        assert_eq!(split_paths("a b\nc", Separator::Null), vec!["a b\nc"]);
        assert!(split_paths("\n\n", Separator::Newline).is_empty());
    }

    #[test]
    fn collision_is_tallied_apart_from_empty_renders() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("a.txt"), b"a").expect("write a");
        fs::write(temp.path().join("taken.txt"), b"taken").expect("write taken");
        let template = compile_template("{{.Dir}}/taken.txt").expect("must parse");
        let mut runner = BatchRunner::new(template, options(temp.path(), false), SilentReporter);

        let result = runner.run(&["a.txt"]).expect("run");
        assert_eq!(result.skipped_collision, 1);
        assert_eq!(result.skipped_empty, 0);
        assert_eq!(result.moved, 0);
        assert_eq!(result.summary(), "moved 0 file(s)");
    }

    #[test]
    fn empty_template_leaves_every_file_alone() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("a.txt"), b"a").expect("write");
        let template = compile_template("").expect("must parse");
        let mut runner = BatchRunner::new(template, options(temp.path(), true), SilentReporter);

        let result = runner.run(&["a.txt", "b.txt"]).expect("run");
        assert_eq!(result.skipped_empty, 2);
        assert_eq!(result.summary(), "would have moved 0 file(s)");
        assert!(temp.path().join("a.txt").exists());
    }

    #[test]
    fn empty_render_skips_without_consuming_an_index() {
        let temp = tempdir().expect("tempdir");
        for name in ["a.jpg", "b.txt", "c.jpg"] {
            fs::write(temp.path().join(name), name).expect("write");
        }
        let template = compile_template(
            r#"{{if eq .Ext ".jpg"}}{{.Dir}}/{{printf "%02d" .N}}{{.Ext}}{{end}}"#,
        )
        .expect("must parse");
        let mut runner = BatchRunner::new(template, options(temp.path(), false), SilentReporter);

        let result = runner.run(&["a.jpg", "b.txt", "c.jpg"]).expect("run");
        assert_eq!(result.considered, 3);
        assert_eq!(result.moved, 2);
        assert_eq!(result.skipped_empty, 1);
        assert!(temp.path().join("01.jpg").exists());
        assert!(temp.path().join("02.jpg").exists());
        assert!(temp.path().join("b.txt").exists());
    }

    #[test]
    fn render_error_aborts_and_still_reports_tally() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("a.txt"), b"a").expect("write");
        let template = compile_template("{{.Dir}}/{{.Stat.Size}}.bin").expect("must parse");
        let mut runner = BatchRunner::new(
            template,
            options(temp.path(), false),
            TextReporter::new(Vec::new(), Vec::new()),
        );

        let err = runner
            .run(&["a.txt", "missing.txt", "never.txt"])
            .expect_err("missing file must abort");
        assert!(matches!(err, BatchError::Render { ref path, .. } if path == "missing.txt"));
        assert!(temp.path().join("1.bin").exists());

        let (_, stderr) = runner.into_reporter().into_inner();
        let stderr = String::from_utf8(stderr).expect("utf8");
        assert!(stderr.contains("moved 1 file(s)"), "{stderr}");
    }

    #[test]
    fn move_error_is_fatal() {
        let temp = tempdir().expect("tempdir");
        let template = compile_template("{{.Dir}}/moved-{{.Base}}").expect("must parse");
        let mut runner = BatchRunner::new(template, options(temp.path(), false), SilentReporter);

        let err = runner.run(&["gone.txt"]).expect_err("must fail");
        assert!(matches!(err, BatchError::Move(_)));
    }

    #[test]
    fn run_reader_honours_null_separator() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("with\nnewline.txt"), b"x").expect("write");
        let template = compile_template("{{.Dir}}/plain.txt").expect("must parse");
        let mut opts = options(temp.path(), false);
        opts.separator = Separator::Null;
        let mut runner = BatchRunner::new(template, opts, SilentReporter);

        let result = runner
            .run_reader("with\nnewline.txt\0".as_bytes())
            .expect("run");
        assert_eq!(result.moved, 1);
        assert!(temp.path().join("plain.txt").exists());
    }

    #[test]
    fn run_reader_rejects_non_utf8_input() {
        let temp = tempdir().expect("tempdir");
        let template = compile_template("{{.Base}}").expect("must parse");
        let mut runner = BatchRunner::new(template, options(temp.path(), true), SilentReporter);
        let err = runner.run_reader(&[0xff, 0xfe][..]).expect_err("must fail");
        assert!(matches!(err, BatchError::ReadInput(_)));
    }
}
