//! JSON Lines ntuples: one [`Event`] per line, chained across files.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};

use eop_core::{Error, Event, EventIter, ObservationSource, Result};

/// Chain of JSONL ntuple files, read lazily in order.
#[derive(Debug, Clone)]
pub struct JsonlSource {
    paths: Vec<PathBuf>,
}

impl JsonlSource {
    /// Chain the given files. At least one is required.
    pub fn new(paths: Vec<PathBuf>) -> Result<Self> {
        if paths.is_empty() {
            return Err(Error::Config("no input ntuples given".into()));
        }
        Ok(Self { paths })
    }

    /// Files in chain order.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl ObservationSource for JsonlSource {
    fn events(&self) -> Result<EventIter<'_>> {
        // Fail before the scan starts rather than halfway through the chain.
        if let Some(missing) = self.paths.iter().find(|p| !p.is_file()) {
            return Err(Error::Config(format!("ntuple not found: {}", missing.display())));
        }
        Ok(Box::new(JsonlEvents { paths: self.paths.iter(), current: None }))
    }
}

struct OpenFile<'a> {
    path: &'a Path,
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

struct JsonlEvents<'a> {
    paths: std::slice::Iter<'a, PathBuf>,
    current: Option<OpenFile<'a>>,
}

impl Iterator for JsonlEvents<'_> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let Some(cur) = self.current.as_mut() else {
                let path = self.paths.next()?;
                match File::open(path) {
                    Ok(f) => {
                        tracing::debug!(path = %path.display(), "reading ntuple");
                        self.current =
                            Some(OpenFile { path, lines: BufReader::new(f).lines(), line_no: 0 });
                        continue;
                    }
                    Err(e) => {
                        return Some(Err(Error::Io(std::io::Error::new(
                            e.kind(),
                            format!("{}: {e}", path.display()),
                        ))));
                    }
                }
            };

            match cur.lines.next() {
                None => {
                    self.current = None;
                }
                Some(Err(e)) => {
                    let msg = format!("{}:{}: {e}", cur.path.display(), cur.line_no + 1);
                    self.current = None;
                    return Some(Err(Error::Io(std::io::Error::new(e.kind(), msg))));
                }
                Some(Ok(line)) => {
                    cur.line_no += 1;
                    if line.trim().is_empty() {
                        continue;
                    }
                    return Some(serde_json::from_str::<Event>(&line).map_err(|e| {
                        Error::Validation(format!("{}:{}: bad entry: {e}", cur.path.display(), cur.line_no))
                    }));
                }
            }
        }
    }
}

/// Write events as JSON Lines.
pub fn write_jsonl<'a>(path: impl AsRef<Path>, events: impl IntoIterator<Item = &'a Event>) -> Result<()> {
    let mut w = BufWriter::new(File::create(path.as_ref())?);
    for event in events {
        serde_json::to_writer(&mut w, event)?;
        w.write_all(b"\n")?;
    }
    w.flush()?;
    Ok(())
}
