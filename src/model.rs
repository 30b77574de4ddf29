use crate::input::WordSource;
#[cfg(feature = "cli")]
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub targets: Vec<TargetSpec>,
    pub wordlist: WordSource,
    pub threads: usize,
    pub method: Method,
    pub connect_timeout: Duration,
    /// Bound on every single read or write on an established connection.
    pub read_timeout: Duration,
    pub max_reply_bytes: usize,
    pub helo_domain: String,
    pub mail_from: String,
    pub on_worker_error: WorkerErrorPolicy,
    pub output: OutputConfig,
}

/// The verification verbs a server may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(ValueEnum))]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Vrfy,
    Expn,
    Rcpt,
}

impl Method {
    /// Fallback order used when the requested method is disabled.
    pub const ORDER: [Method; 3] = [Method::Vrfy, Method::Expn, Method::Rcpt];

    pub const PROBE_USER: &'static [u8] = b"root";

    pub fn verb(self) -> &'static str {
        match self {
            Method::Vrfy => "VRFY",
            Method::Expn => "EXPN",
            Method::Rcpt => "RCPT",
        }
    }

    fn prefix(self) -> &'static [u8] {
        match self {
            Method::Vrfy => b"VRFY ",
            Method::Expn => b"EXPN ",
            Method::Rcpt => b"RCPT TO:",
        }
    }

    /// Command line for `username`, without CRLF. Usernames are sent as raw
    /// bytes.
    pub fn command(self, username: &[u8]) -> Vec<u8> {
        [self.prefix(), username].concat()
    }

    pub fn probe_command(self) -> Vec<u8> {
        self.command(Self::PROBE_USER)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// Which verification verbs the target accepted during probing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    allowed: BTreeMap<Method, bool>,
}

impl ProbeResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, method: Method, allowed: bool) {
        self.allowed.insert(method, allowed);
    }

    pub fn is_allowed(&self, method: Method) -> bool {
        self.allowed.get(&method).copied().unwrap_or(false)
    }

    pub fn allowed_methods(&self) -> impl Iterator<Item = Method> + '_ {
        Method::ORDER
            .into_iter()
            .filter(move |method| self.is_allowed(*method))
    }
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = Method::ORDER
            .iter()
            .map(|method| {
                let state = if self.is_allowed(*method) {
                    "allowed"
                } else {
                    "disabled"
                };
                format!("{method}={state}")
            })
            .collect::<Vec<_>>();
        f.write_str(&parts.join(" "))
    }
}

/// A candidate the server confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub target: String,
    pub method: Method,
    pub username: String,
    pub reply: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum WorkerErrorPolicy {
    /// Any worker connection failure stops the whole run.
    #[default]
    Abort,
    /// Retire the failing worker and keep going with the rest.
    Continue,
}

impl fmt::Display for WorkerErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerErrorPolicy::Abort => write!(f, "abort"),
            WorkerErrorPolicy::Continue => write!(f, "continue"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(ValueEnum))]
pub enum OutputFormat {
    Pretty,
    Jsonl,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Pretty => write!(f, "pretty"),
            OutputFormat::Jsonl => write!(f, "jsonl"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub target: String,
    pub method: Method,
    pub probe: ProbeResult,
    pub candidates: u64,
    pub matches: u64,
    pub retired_workers: usize,
    pub interrupted: bool,
    pub elapsed_ms: u128,
}
