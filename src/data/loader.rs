// ============================================================
// Layer 4 — JSONL Example Loader
// ============================================================
// Reads pre-tokenised examples, one JSON object per line:
//
//   {"input_ids": [65, 2054, ...], "start_token": 37, "end_token": 41, ...}
//
// Loading is fail-fast: a line that is not valid JSON, is
// missing a required field, or has no tokens aborts the whole
// load with the file name and line number. Blank lines are
// skipped.
//
// Spans are not checked against the sequence here. Offsets
// that are negative, reversed or past the end are kept and
// counted; the batcher turns them into clamped or ignored
// targets.
//
// Reference: serde_json documentation
//            Rust Book §9 (Error Handling)

use anyhow::{bail, Context, Result};
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::PathBuf,
};

use crate::domain::example::NqExample;
use crate::domain::traits::ExampleSource;

/// Loads every example from a `.jsonl` file.
/// Implements the ExampleSource trait from Layer 3.
pub struct JsonlExampleSource {
    path: PathBuf,
}

impl JsonlExampleSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ExampleSource for JsonlExampleSource {
    fn load_all(&self) -> Result<Vec<NqExample>> {
        let file = File::open(&self.path)
            .with_context(|| format!("Cannot open dataset '{}'", self.path.display()))?;

        let mut examples = Vec::new();
        let mut out_of_range = 0usize;

        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line_no = idx + 1;
            let line = line.with_context(|| {
                format!("Cannot read line {} of '{}'", line_no, self.path.display())
            })?;

            if line.trim().is_empty() {
                continue;
            }

            let example = parse_record(&line)
                .with_context(|| format!("{}:{}", self.path.display(), line_no))?;
            if !example.span_in_range() {
                out_of_range += 1;
            }
            examples.push(example);
        }

        tracing::info!(
            "Loaded {} examples from '{}'",
            examples.len(),
            self.path.display()
        );
        if out_of_range > 0 {
            tracing::warn!(
                "{} examples in '{}' have answer offsets outside their tokens; \
                 negative offsets train on position 0, offsets past the end are ignored",
                out_of_range,
                self.path.display()
            );
        }
        Ok(examples)
    }
}

/// Parse and validate a single JSONL record.
fn parse_record(line: &str) -> Result<NqExample> {
    let example: NqExample =
        serde_json::from_str(line).context("malformed example record")?;

    if let Err(reason) = example.validate() {
        bail!("invalid example record: {reason}");
    }
    Ok(example)
}
