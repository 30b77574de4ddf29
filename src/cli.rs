use crate::input::WordSource;
use crate::model::{Method, OutputConfig, OutputFormat, TargetSpec, WorkerErrorPolicy};
use clap::{ArgAction, Parser};
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(
    name = "smtp-user-enum",
    author,
    version,
    about = "Enumerate SMTP mailboxes with VRFY, EXPN or RCPT",
    long_about = "Enumerate SMTP mailboxes with VRFY, EXPN or RCPT.\n\
                  Multiple targets are enumerated one after another."
)]
pub struct Cli {
    /// Target SMTP servers
    #[arg(value_name = "TARGETS", required = true, num_args = 1..)]
    pub targets: Vec<String>,

    /// SMTP port
    #[arg(short = 'p', long = "port", default_value_t = 25)]
    pub port: u16,

    /// Wordlist containing usernames, or `-` for standard input
    #[arg(short = 'w', long = "wordlist", value_name = "FILE")]
    pub wordlist: String,

    /// Number of concurrent connections
    #[arg(short = 't', long = "threads", default_value_t = 8)]
    pub threads: usize,

    /// Verification method to prefer
    #[arg(short = 'm', long = "method", value_enum, ignore_case = true, default_value_t = Method::Vrfy)]
    pub method: Method,

    /// Print the server reply next to each match and enable debug logs
    #[arg(short = 'v', long = "verbose", action = ArgAction::SetTrue)]
    pub verbose: bool,

    /// Connect timeout in milliseconds
    #[arg(long = "connect-timeout", default_value_t = 5000)]
    pub connect_timeout_ms: u64,

    /// Timeout for every read and write in milliseconds
    #[arg(long = "read-timeout", default_value_t = 10000)]
    pub read_timeout_ms: u64,

    /// Max bytes kept from a single reply
    #[arg(long = "max-reply-bytes", default_value_t = 4096)]
    pub max_reply_bytes: usize,

    /// Domain announced in HELO before RCPT enumeration
    #[arg(long = "helo", default_value = "localhost")]
    pub helo: String,

    /// Envelope sender used before RCPT enumeration
    #[arg(long = "mail-from", default_value = "user@example.com")]
    pub mail_from: String,

    /// What to do when one worker connection fails
    #[arg(long = "on-error", value_enum, default_value_t = WorkerErrorPolicy::Abort)]
    pub on_error: WorkerErrorPolicy,

    /// Output format
    #[arg(long = "output", value_enum, default_value_t = OutputFormat::Pretty)]
    pub output: OutputFormat,
}

impl Cli {
    pub fn into_config(self) -> anyhow::Result<crate::model::Config> {
        if self.threads == 0 {
            anyhow::bail!("threads must be greater than zero");
        }

        if self.max_reply_bytes == 0 {
            anyhow::bail!("max-reply-bytes must be greater than zero");
        }

        let wordlist = WordSource::parse(&self.wordlist);
        if wordlist.is_stdin() && self.targets.len() > 1 {
            anyhow::bail!("a wordlist read from stdin can only be used with a single target");
        }

        let targets = self
            .targets
            .into_iter()
            .map(|host| TargetSpec {
                host,
                port: self.port,
            })
            .collect();

        Ok(crate::model::Config {
            targets,
            wordlist,
            threads: self.threads,
            method: self.method,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            max_reply_bytes: self.max_reply_bytes,
            helo_domain: self.helo,
            mail_from: self.mail_from,
            on_worker_error: self.on_error,
            output: OutputConfig {
                format: self.output,
                verbose: self.verbose,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("smtp-user-enum").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_match_classic_tool() {
        let cfg = parse(&["mx.example", "-w", "users.txt"])
            .unwrap()
            .into_config()
            .unwrap();
        assert_eq!(cfg.targets[0].port, 25);
        assert_eq!(cfg.threads, 8);
        assert_eq!(cfg.method, Method::Vrfy);
        assert!(!cfg.output.verbose);
        assert_eq!(cfg.on_worker_error, WorkerErrorPolicy::Abort);
    }

    #[test]
    fn missing_target_is_a_usage_error() {
        assert!(parse(&["-w", "users.txt"]).is_err());
    }

    #[test]
    fn method_is_case_insensitive() {
        let cli = parse(&["mx", "-w", "u", "-m", "RCPT"]).unwrap();
        assert_eq!(cli.method, Method::Rcpt);
        let cli = parse(&["mx", "-w", "u", "--method", "expn"]).unwrap();
        assert_eq!(cli.method, Method::Expn);
    }

    #[test]
    fn rejects_zero_threads() {
        let err = parse(&["mx", "-w", "u", "-t", "0"])
            .unwrap()
            .into_config()
            .unwrap_err();
        assert!(err.to_string().contains("threads"));
    }

    #[test]
    fn stdin_wordlist_needs_single_target() {
        let err = parse(&["a", "b", "-w", "-"])
            .unwrap()
            .into_config()
            .unwrap_err();
        assert!(err.to_string().contains("stdin"));
        assert!(parse(&["a", "-w", "-"]).unwrap().into_config().is_ok());
    }

    #[test]
    fn every_target_shares_the_port() {
        let cfg = parse(&["a", "b", "-p", "2525", "-w", "u", "-v"])
            .unwrap()
            .into_config()
            .unwrap();
        assert_eq!(cfg.targets.len(), 2);
        assert!(cfg.targets.iter().all(|t| t.port == 2525));
        assert!(cfg.output.verbose);
    }
}
