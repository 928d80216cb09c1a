// ai
//! 🔬 RecordScanner — the part that actually greps.
//!
//! 🎬 *[INT. A BLOCKING THREAD — CONTINUOUS]*
//! *[bytes trickle in from a bucket three time zones away. one JSON value at a time,]*
//! *[they are decoded, judged, and either kept or forgotten.]*
//!
//! An object body is a run of JSON values back to back: newline-delimited, pretty
//! printed, or jammed together with no whitespace at all. It is NOT one big array.
//! The scanner feeds the body through serde_json's streaming deserializer, evaluates
//! the [`Filter`] against every record, and pushes the winners into a [`MatchSink`].
//!
//! The first decode or evaluation failure stops the scan of that stream. Matches
//! already emitted stay emitted. The stream is taken by value, so it is closed on
//! every exit path the moment `scan` returns. 🦆

use std::io::{self, BufReader, Read, Write};

use flate2::Compression;
use flate2::write::GzEncoder;
use serde_json::Value;

use crate::common::{MatchEncoding, ScanResult};
use crate::filter::{Filter, FilterError};

/// 💀 Why a scan stopped early. Recorded per object, never fatal to the batch.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// 🧱 The bytes stopped being JSON (or the body stopped being bytes).
    #[error("invalid JSON after {records} records: {source}")]
    Decode {
        records: usize,
        #[source]
        source: serde_json::Error,
    },
    /// 🧾 A JSON value that is not an object cannot be a record.
    #[error("record {record} is a {kind}, not an object")]
    NotARecord { record: usize, kind: &'static str },
    /// ⚖️ The filter choked on a particular record.
    #[error("record {record}: {source}")]
    Eval {
        record: usize,
        #[source]
        source: FilterError,
    },
    /// 🚰 The match could not be written out.
    #[error("could not emit match: {0}")]
    Emit(#[from] io::Error),
}

/// 📊 The tally of one `scan` call.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub scanned: usize,
    pub matched: usize,
    pub error: Option<ScanError>,
}

/// 🪣 Where matches go. Shared across every object in a batch so the ceiling is cumulative.
pub enum MatchSink {
    /// 📜 Matches as compact JSON strings, plus a running estimate of their encoded size.
    Plain { matches: Vec<String>, wire_bytes: usize },
    /// 🗜️ Matches as newline-delimited JSON through a gzip encoder.
    Gzip { encoder: GzEncoder<Vec<u8>>, matched: usize },
}

impl std::fmt::Debug for MatchSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchSink")
            .field("encoding", &self.encoding())
            .field("matched", &self.matched())
            .field("wire_len", &self.wire_len())
            .finish()
    }
}

impl MatchSink {
    pub fn new(encoding: MatchEncoding) -> Self {
        match encoding {
            MatchEncoding::Plain => MatchSink::Plain {
                matches: Vec::new(),
                wire_bytes: 0,
            },
            MatchEncoding::Gzip => MatchSink::Gzip {
                encoder: GzEncoder::new(Vec::new(), Compression::default()),
                matched: 0,
            },
        }
    }

    pub fn encoding(&self) -> MatchEncoding {
        match self {
            MatchSink::Plain { .. } => MatchEncoding::Plain,
            MatchSink::Gzip { .. } => MatchEncoding::Gzip,
        }
    }

    pub fn emit(&mut self, record: &Value) -> io::Result<()> {
        match self {
            MatchSink::Plain {
                matches,
                wire_bytes,
            } => {
                let line = serde_json::to_string(record)?;
                *wire_bytes += escaped_len(&line);
                matches.push(line);
            }
            MatchSink::Gzip { encoder, matched } => {
                serde_json::to_writer(&mut *encoder, record)?;
                encoder.write_all(b"\n")?;
                *matched += 1;
            }
        }
        Ok(())
    }

    pub fn matched(&self) -> usize {
        match self {
            MatchSink::Plain { matches, .. } => matches.len(),
            MatchSink::Gzip { matched, .. } => *matched,
        }
    }

    /// 📏 How many bytes these matches will take in the serialized result.
    ///
    /// Plain matches are strings inside a JSON array, so quotes, commas and escaping count.
    /// Gzip bytes travel as one quoted base64 string: four characters per three bytes.
    pub fn wire_len(&self) -> usize {
        match self {
            MatchSink::Plain { wire_bytes, .. } => *wire_bytes,
            MatchSink::Gzip { encoder, .. } => base64_len(encoder.get_ref().len()),
        }
    }

    /// 📬 Move the matches into the result. Finishes the gzip stream if there is one.
    pub fn finish_into(self, result: &mut ScanResult) -> io::Result<()> {
        match self {
            MatchSink::Plain { matches, .. } => result.matches = matches,
            MatchSink::Gzip { encoder, matched } => {
                let compressed = encoder.finish()?;
                // -- an empty gzip member is still ~20 bytes of nothing; ship nothing instead
                if matched > 0 {
                    result.gzip_matches = compressed;
                }
            }
        }
        Ok(())
    }
}

/// 🔬 Scans one stream against one compiled filter.
#[derive(Debug, Clone, Copy)]
pub struct RecordScanner<'f> {
    filter: &'f Filter,
}

impl<'f> RecordScanner<'f> {
    pub fn new(filter: &'f Filter) -> Self {
        Self { filter }
    }

    /// 🔁 Decode, judge, emit, repeat. Stops at the first broken record.
    pub fn scan<R: Read>(&self, stream: R, sink: &mut MatchSink) -> ScanReport {
        let mut report = ScanReport::default();
        let records =
            serde_json::Deserializer::from_reader(BufReader::new(stream)).into_iter::<Value>();

        for decoded in records {
            let record = match decoded {
                Ok(record) => record,
                Err(source) => {
                    report.error = Some(ScanError::Decode {
                        records: report.scanned,
                        source,
                    });
                    break;
                }
            };
            report.scanned += 1;

            if !record.is_object() {
                report.error = Some(ScanError::NotARecord {
                    record: report.scanned,
                    kind: kind_of(&record),
                });
                break;
            }

            match self.filter.matches(&record) {
                Ok(true) => {
                    if let Err(e) = sink.emit(&record) {
                        report.error = Some(ScanError::Emit(e));
                        break;
                    }
                    report.matched += 1;
                }
                Ok(false) => {}
                Err(source) => {
                    report.error = Some(ScanError::Eval {
                        record: report.scanned,
                        source,
                    });
                    break;
                }
            }
        }
        report
    }
}

/// 🧮 Length of `line` once it is itself a JSON string inside an array: quotes, comma, escapes.
fn escaped_len(line: &str) -> usize {
    let escapes = line.bytes().filter(|b| matches!(b, b'"' | b'\\')).count();
    line.len() + escapes + 3
}

/// 🔤 Length of `bytes` bytes as a base64 JSON string: padded quads, two quotes, a comma.
fn base64_len(bytes: usize) -> usize {
    bytes.div_ceil(3).saturating_mul(4).saturating_add(3)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
