use std::{
    fs,
    io::{self, BufRead, BufReader},
    num::ParseIntError,
    path::Path,
    str::{self, Utf8Error},
    thread::{self, JoinHandle},
};

use crossbeam::channel::{Receiver, Sender};
use log::warn;
use thiserror::Error;
use xz2::read::XzDecoder;

use crate::hierarchy::{Hierarchy, Op};

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("expected `<op> <address>`, found {0} token(s)")]
    TokenCount(usize),
    #[error("unknown operation `{0}`")]
    UnknownOp(String),
    #[error("invalid hex address `{addr}`")]
    BadAddress {
        addr: String,
        #[source]
        source: ParseIntError,
    },
    #[error("invalid hex address `{0}`: no sign allowed")]
    SignedAddress(String),
    #[error("line is not valid UTF-8")]
    NotUtf8(#[source] Utf8Error),
    #[error("failed to read trace")]
    Io(#[from] io::Error),
}

impl TraceError {
    /// Malformed lines are skipped, a broken stream ends the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TraceError::Io(_))
    }
}

#[derive(Debug, Error)]
#[error("trace aborted at line {number}")]
pub struct TraceAbort {
    pub number: usize,
    #[source]
    pub source: TraceError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub op: Op,
    pub addr: u64,
}

/// Parses `<op> <hex address>`. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<Access>, TraceError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let (op, addr) = match tokens.as_slice() {
        [] => return Ok(None),
        [op, addr] => (*op, *addr),
        _ => return Err(TraceError::TokenCount(tokens.len())),
    };

    let op = op.parse::<Op>()?;
    let digits = addr
        .strip_prefix("0x")
        .or_else(|| addr.strip_prefix("0X"))
        .unwrap_or(addr);
    if digits.starts_with(['+', '-']) {
        return Err(TraceError::SignedAddress(addr.to_owned()));
    }
    let addr = u64::from_str_radix(digits, 16).map_err(|source| TraceError::BadAddress {
        addr: addr.to_owned(),
        source,
    })?;

    Ok(Some(Access { op, addr }))
}

fn decode_line(raw: &[u8]) -> Result<Option<Access>, TraceError> {
    let text = str::from_utf8(raw).map_err(TraceError::NotUtf8)?;
    parse_line(text)
}

#[derive(Debug)]
pub struct Line {
    /// 1-based line number in the trace file.
    pub number: usize,
    pub entry: Result<Access, TraceError>,
}

/// Feeds one block of trace lines through the hierarchy and returns how many
/// malformed lines were logged and skipped. A fatal line stops the replay.
pub fn replay(hierarchy: &mut Hierarchy, block: Vec<Line>) -> Result<u64, TraceAbort> {
    let mut skipped = 0;
    for line in block {
        match line.entry {
            Ok(access) => {
                hierarchy.process(access.op, access.addr);
            }
            Err(source) if source.is_fatal() => {
                return Err(TraceAbort {
                    number: line.number,
                    source,
                });
            }
            Err(err) => {
                warn!("line {}: {err}, skipping", line.number);
                skipped += 1;
            }
        }
    }
    Ok(skipped)
}

pub struct Trace {
    pub rec: Receiver<Vec<Line>>,
    _thread: JoinHandle<()>,
}

impl Trace {
    /// Opens a text trace, decompressing it first if the file ends in `.xz`.
    pub fn open(path: &Path, lines_per_block: usize, blocks_per_queue: usize) -> io::Result<Trace> {
        let stream = fs::File::open(path)?;
        let reader: Box<dyn BufRead + Send> = match path.extension() {
            Some(ext) if ext == "xz" => Box::new(BufReader::new(XzDecoder::new(stream))),
            _ => Box::new(BufReader::new(stream)),
        };
        Ok(Trace::from_reader(reader, lines_per_block, blocks_per_queue))
    }

    pub fn from_reader<R: BufRead + Send + 'static>(
        reader: R,
        lines_per_block: usize,
        blocks_per_queue: usize,
    ) -> Trace {
        let (sender, receiver) = crossbeam::channel::bounded(blocks_per_queue);

        let t = thread::spawn(move || Trace::run_thread(reader, lines_per_block.max(1), sender));

        Trace {
            rec: receiver,
            _thread: t,
        }
    }

    fn run_thread<R: BufRead>(mut reader: R, lines_per_block: usize, queue: Sender<Vec<Line>>) {
        let mut buffer = Vec::with_capacity(lines_per_block);
        // Raw bytes so a line that is not UTF-8 is skipped instead of ending the stream.
        let mut raw = Vec::new();
        let mut number = 0;
        loop {
            raw.clear();
            let (entry, fatal) = match reader.read_until(b'\n', &mut raw) {
                Ok(0) => break,
                Ok(_) => {
                    number += 1;
                    match decode_line(&raw) {
                        Ok(None) => continue,
                        Ok(Some(access)) => (Ok(access), false),
                        Err(err) => (Err(err), false),
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    number += 1;
                    (Err(TraceError::Io(err)), true)
                }
            };
            buffer.push(Line { number, entry });

            if fatal {
                break;
            }
            if buffer.len() == lines_per_block {
                let full = std::mem::replace(&mut buffer, Vec::with_capacity(lines_per_block));
                if queue.send(full).is_err() {
                    return;
                }
            }
        }

        if !buffer.is_empty() {
            // Receiver hung up; nothing left to do either way.
            let _ = queue.send(buffer);
        }
    }
}
