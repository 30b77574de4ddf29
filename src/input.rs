use crate::error::{EnumError, Result};
use crate::model::Method;
use futures::{Stream, StreamExt};
use std::fmt;
use std::io::BufRead;
use std::path::PathBuf;
use std::pin::Pin;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, SplitStream};

/// RFC 5321 limit for a command line, CRLF included.
pub const MAX_COMMAND_LINE: usize = 512;

/// Raw wordlist lines with the line terminator removed. Lines are bytes, so
/// entries in legacy encodings reach the server untouched.
pub type CandidateStream = Pin<Box<dyn Stream<Item = std::io::Result<Vec<u8>>> + Send>>;

/// Where candidate usernames come from. Files can be reopened for every
/// target; standard input can be consumed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WordSource {
    File(PathBuf),
    Stdin,
}

impl WordSource {
    pub fn parse(arg: &str) -> Self {
        if arg == "-" {
            WordSource::Stdin
        } else {
            WordSource::File(PathBuf::from(arg))
        }
    }

    pub fn is_stdin(&self) -> bool {
        matches!(self, WordSource::Stdin)
    }

    /// Opens the source from its beginning as a lazy line stream.
    pub async fn open(&self) -> Result<CandidateStream> {
        match self {
            WordSource::Stdin => {
                let stdin = std::io::BufReader::new(std::io::stdin());
                blocking_lines(stdin).map_err(|source| EnumError::Wordlist {
                    path: self.to_string(),
                    source,
                })
            }
            WordSource::File(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .map_err(|source| EnumError::Wordlist {
                        path: path.display().to_string(),
                        source,
                    })?;
                let lines = SplitStream::new(BufReader::new(file).split(b'\n'))
                    .map(|line| line.map(strip_cr));
                Ok(Box::pin(lines))
            }
        }
    }
}

/// Reads `reader` on its own thread. Tokio's stdin parks a blocking-pool
/// thread that runtime shutdown waits on; a detached thread does not hold
/// the process open after an interrupt.
pub fn blocking_lines<R>(reader: R) -> std::io::Result<CandidateStream>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(64);
    std::thread::Builder::new()
        .name("wordlist-reader".into())
        .spawn(move || {
            let mut reader = reader;
            loop {
                let mut line = Vec::new();
                match reader.read_until(b'\n', &mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        if line.last() == Some(&b'\n') {
                            line.pop();
                        }
                        if tx.blocking_send(Ok(strip_cr(line))).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        let _ = tx.blocking_send(Err(err));
                        break;
                    }
                }
            }
        })?;
    Ok(Box::pin(ReceiverStream::new(rx)))
}

fn strip_cr(mut line: Vec<u8>) -> Vec<u8> {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    line
}

impl fmt::Display for WordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WordSource::Stdin => write!(f, "<stdin>"),
            WordSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    Ready(Vec<u8>),
    Blank,
    Rejected(&'static str),
}

/// Turns one wordlist line into something safe to put on the wire. Only
/// trailing whitespace is dropped.
pub fn prepare_candidate(line: &[u8], method: Method) -> Candidate {
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |pos| pos + 1);
    let word = &line[..end];
    if word.is_empty() {
        return Candidate::Blank;
    }
    if word.iter().any(|b| matches!(b, b'\r' | b'\n' | 0)) {
        return Candidate::Rejected("contains control bytes");
    }
    if method.command(word).len() + 2 > MAX_COMMAND_LINE {
        return Candidate::Rejected("command line too long");
    }
    Candidate::Ready(word.to_vec())
}
