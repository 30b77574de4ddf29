use crate::client::{verb_disabled, SessionOptions, SmtpSession};
use crate::error::{EnumError, Result};
use crate::model::{Config, Method, ProbeResult, TargetSpec};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, instrument, warn};

/// Sends the canonical probe for each of `methods` over `session` and records
/// the verdict in `probe`. A method counts as allowed unless the server
/// answers 502 or the exchange fails.
///
/// After a failed exchange the session is out of step with the server (a
/// late reply may still arrive), so probing stops there and the methods not
/// yet tried are returned.
pub async fn probe_methods<'m, S>(
    session: &mut SmtpSession<S>,
    methods: &'m [Method],
    probe: &mut ProbeResult,
) -> &'m [Method]
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    for (idx, method) in methods.iter().copied().enumerate() {
        match session.send_and_read(method.probe_command()).await {
            Ok(reply) => {
                debug!(%method, reply = %reply.text, "probe reply");
                probe.set(method, !verb_disabled(&reply.text));
            }
            Err(err) => {
                debug!(%method, error = %err, "probe exchange failed");
                probe.set(method, false);
                return &methods[idx + 1..];
            }
        }
    }
    &[]
}

/// Keeps `requested` when the server allows it, otherwise falls back to the
/// first allowed method in `Method::ORDER`.
pub fn select_method(
    requested: Method,
    probe: &ProbeResult,
    target: &TargetSpec,
) -> Result<Method> {
    if probe.is_allowed(requested) {
        return Ok(requested);
    }
    probe
        .allowed_methods()
        .next()
        .ok_or_else(|| EnumError::NoMethodAvailable {
            target: target.to_string(),
        })
}

/// Probes `target` over throwaway connections and resolves the method the
/// workers will use. Only the first connection is required; if a later one
/// cannot be opened, the methods left are treated as disallowed.
#[instrument(skip_all, fields(target = %target))]
pub async fn run_probe(target: &TargetSpec, cfg: &Config) -> Result<(ProbeResult, Method)> {
    let opts = SessionOptions::from(cfg);
    let mut session = SmtpSession::connect(target, &opts).await?;
    info!(banner = %session.banner(), "connected");

    let mut probe = ProbeResult::new();
    let mut pending = probe_methods(&mut session, &Method::ORDER, &mut probe).await;
    session.close().await;

    while !pending.is_empty() {
        debug!(remaining = pending.len(), "reconnecting to finish probe");
        match SmtpSession::connect(target, &opts).await {
            Ok(mut session) => {
                pending = probe_methods(&mut session, pending, &mut probe).await;
                session.close().await;
            }
            Err(err) => {
                warn!(error = %err, "probe reconnect failed");
                for method in pending {
                    probe.set(*method, false);
                }
                break;
            }
        }
    }
    info!(methods = %probe, "probe finished");

    if !probe.is_allowed(cfg.method) {
        warn!(method = %cfg.method, "method disallowed by server");
    }
    let method = select_method(cfg.method, &probe, target)?;
    if method != cfg.method {
        info!(from = %cfg.method, to = %method, "switching enumeration method");
    }
    Ok((probe, method))
}
