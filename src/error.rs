use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnumError {
    #[error("connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("connection to {addr} timed out")]
    ConnectTimeout { addr: String },
    #[error("no greeting received from {addr}: {source}")]
    Greeting {
        addr: String,
        #[source]
        source: Box<EnumError>,
    },
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("write failed: {source}")]
    Write {
        #[source]
        source: std::io::Error,
    },
    #[error("read failed: {source}")]
    Read {
        #[source]
        source: std::io::Error,
    },
    #[error("{op} timed out")]
    Timeout { op: &'static str },
    #[error("connection closed by peer")]
    ConnectionClosed,
    #[error("no available enumeration methods on {target}")]
    NoMethodAvailable { target: String },
    #[error("wordlist {path} unreadable: {source}")]
    Wordlist {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("every worker connection failed")]
    WorkersExhausted,
    #[error("worker task failed: {0}")]
    Worker(String),
    #[error("output error: {0}")]
    Output(String),
}

impl EnumError {
    /// True for failures tied to one connection rather than the whole run.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            EnumError::Connect { .. }
                | EnumError::ConnectTimeout { .. }
                | EnumError::Greeting { .. }
                | EnumError::Write { .. }
                | EnumError::Read { .. }
                | EnumError::Timeout { .. }
                | EnumError::ConnectionClosed
        )
    }
}

pub type Result<T, E = EnumError> = std::result::Result<T, E>;
