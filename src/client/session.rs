use crate::client::reply::Reply;
use crate::engine::reader::ReplyReader;
use crate::error::{EnumError, Result};
use crate::model::{Config, Method, TargetSpec};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub connect_timeout: Duration,
    pub io_timeout: Duration,
    pub max_reply_bytes: usize,
}

impl From<&Config> for SessionOptions {
    fn from(cfg: &Config) -> Self {
        Self {
            connect_timeout: cfg.connect_timeout,
            io_timeout: cfg.read_timeout,
            max_reply_bytes: cfg.max_reply_bytes,
        }
    }
}

/// One connection to one SMTP server: strict request/reply, no pipelining.
pub struct SmtpSession<S = TcpStream> {
    stream: Option<S>,
    reader: ReplyReader,
    banner: String,
    peer: String,
    io_timeout: Duration,
}

impl SmtpSession<TcpStream> {
    /// Opens a TCP connection to the first reachable address of `target`
    /// and reads the greeting.
    pub async fn connect(target: &TargetSpec, opts: &SessionOptions) -> Result<Self> {
        let addrs = lookup_host((target.host.as_str(), target.port))
            .await
            .map_err(|source| EnumError::Resolve {
                host: target.host.clone(),
                source,
            })?
            .collect::<Vec<_>>();

        let mut last_err = None;
        for addr in addrs {
            match timeout(opts.connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    stream.set_nodelay(true).ok();
                    return Self::from_stream(stream, target.to_string(), opts).await;
                }
                Ok(Err(source)) => {
                    debug!(%addr, error = %source, "connect attempt failed");
                    last_err = Some(EnumError::Connect {
                        addr: addr.to_string(),
                        source,
                    });
                }
                Err(_) => {
                    debug!(%addr, "connect attempt timed out");
                    last_err = Some(EnumError::ConnectTimeout {
                        addr: addr.to_string(),
                    });
                }
            }
        }

        Err(last_err.unwrap_or_else(|| EnumError::Resolve {
            host: target.host.clone(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses"),
        }))
    }
}

impl<S> SmtpSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps an already-connected stream and reads the greeting from it.
    pub async fn from_stream(stream: S, peer: String, opts: &SessionOptions) -> Result<Self> {
        let mut session = Self {
            stream: Some(stream),
            reader: ReplyReader::new(opts.max_reply_bytes, opts.io_timeout),
            banner: String::new(),
            peer,
            io_timeout: opts.io_timeout,
        };

        match session.read_reply().await {
            Ok(greeting) => {
                debug!(peer = %session.peer, banner = %greeting.text, "greeting received");
                session.banner = greeting.text;
                Ok(session)
            }
            Err(err) => {
                session.close().await;
                Err(EnumError::Greeting {
                    addr: session.peer.clone(),
                    source: Box::new(err),
                })
            }
        }
    }

    pub fn banner(&self) -> &str {
        &self.banner
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Writes `line` followed by CRLF as a single buffer.
    pub async fn send_command(&mut self, line: impl AsRef<[u8]>) -> Result<()> {
        let line = line.as_ref();
        let stream = self.stream.as_mut().ok_or(EnumError::ConnectionClosed)?;
        let mut data = Vec::with_capacity(line.len() + 2);
        data.extend_from_slice(line);
        data.extend_from_slice(b"\r\n");

        let write = async {
            stream.write_all(&data).await?;
            stream.flush().await
        };
        match timeout(self.io_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(EnumError::Write { source }),
            Err(_) => Err(EnumError::Timeout { op: "write" }),
        }
    }

    pub async fn read_reply(&mut self) -> Result<Reply> {
        let stream = self.stream.as_mut().ok_or(EnumError::ConnectionClosed)?;
        let reply = Reply::from(self.reader.read(stream).await?);
        if reply.truncated {
            warn!(peer = %self.peer, code = ?reply.code, "reply truncated");
        }
        Ok(reply)
    }

    pub async fn send_and_read(&mut self, line: impl AsRef<[u8]>) -> Result<Reply> {
        self.send_command(line).await?;
        self.read_reply().await
    }

    pub async fn verify(&mut self, method: Method, username: &[u8]) -> Result<Reply> {
        self.send_and_read(method.command(username)).await
    }

    /// Releases the connection. Safe to call any number of times.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = timeout(self.io_timeout, stream.shutdown()).await;
            debug!(peer = %self.peer, "connection closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};

    fn opts() -> SessionOptions {
        SessionOptions {
            connect_timeout: Duration::from_millis(200),
            io_timeout: Duration::from_millis(200),
            max_reply_bytes: 256,
        }
    }

    #[tokio::test]
    async fn stores_banner_and_round_trips_commands() {
        let (client, server) = tokio::io::duplex(1024);
        let server = tokio::spawn(async move {
            let (rd, mut wr) = tokio::io::split(server);
            wr.write_all(b"220 mx.example ESMTP\r\n").await.unwrap();
            let mut lines = BufReader::new(rd).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            assert_eq!(line, "VRFY alice");
            wr.write_all(b"250 2.1.5 alice\r\n").await.unwrap();
            lines.next_line().await.unwrap()
        });

        let mut session = SmtpSession::from_stream(client, "mx:25".into(), &opts())
            .await
            .unwrap();
        assert_eq!(session.banner(), "220 mx.example ESMTP");

        let reply = session.verify(Method::Vrfy, b"alice").await.unwrap();
        assert!(reply.is_positive());
        assert_eq!(reply.code, Some(250));

        session.close().await;
        session.close().await;
        assert!(session.is_closed());
        assert_eq!(server.await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_greeting_is_a_greeting_error() {
        let (client, _server) = tokio::io::duplex(64);
        let err = SmtpSession::from_stream(client, "mx:25".into(), &opts())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, EnumError::Greeting { .. }));
    }

    #[tokio::test]
    async fn oversized_reply_is_flagged_and_next_reply_stays_aligned() {
        let (client, mut server) = tokio::io::duplex(1024);
        server.write_all(b"220 hi\r\n").await.unwrap();
        let opts = SessionOptions {
            max_reply_bytes: 16,
            ..opts()
        };
        let mut session = SmtpSession::from_stream(client, "mx:25".into(), &opts)
            .await
            .unwrap();

        server
            .write_all(b"250-a very long first line\r\n250 done\r\n550 nope\r\n")
            .await
            .unwrap();
        let first = session.read_reply().await.unwrap();
        assert!(first.truncated);
        assert_eq!(first.code, Some(250));
        let second = session.read_reply().await.unwrap();
        assert!(!second.truncated);
        assert_eq!(second.text, "550 nope");
    }

    #[tokio::test]
    async fn sends_username_bytes_verbatim() {
        let (client, server) = tokio::io::duplex(1024);
        let server = tokio::spawn(async move {
            let (mut rd, mut wr) = tokio::io::split(server);
            wr.write_all(b"220 hi\r\n").await.unwrap();
            let mut line = Vec::new();
            let mut byte = [0u8; 1];
            while !line.ends_with(b"\r\n") {
                rd.read_exact(&mut byte).await.unwrap();
                line.push(byte[0]);
            }
            wr.write_all(b"550 no\r\n").await.unwrap();
            line
        });

        let mut session = SmtpSession::from_stream(client, "mx:25".into(), &opts())
            .await
            .unwrap();
        session.verify(Method::Vrfy, b"jos\xe9").await.unwrap();
        assert_eq!(server.await.unwrap(), b"VRFY jos\xe9\r\n");
    }

    #[tokio::test]
    async fn commands_after_close_fail() {
        let (client, mut server) = tokio::io::duplex(64);
        server.write_all(b"220 hi\r\n").await.unwrap();
        let mut session = SmtpSession::from_stream(client, "mx:25".into(), &opts())
            .await
            .unwrap();
        session.close().await;
        let err = session.send_command("VRFY bob").await.unwrap_err();
        assert!(matches!(err, EnumError::ConnectionClosed));
    }

    #[tokio::test]
    async fn refused_connection_is_a_connect_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let target = TargetSpec {
            host: "127.0.0.1".into(),
            port,
        };
        let err = SmtpSession::connect(&target, &opts()).await.err().unwrap();
        assert!(err.is_io());
    }
}
