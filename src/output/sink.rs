use crate::model::{Match, OutputConfig, OutputFormat};
use serde::Serialize;
use std::io::{BufWriter, Write};

/// Renders matches, one line each, in arrival order.
pub struct OutputSink {
    cfg: OutputConfig,
    writer: BufWriter<Box<dyn Write + Send>>,
}

#[derive(Serialize)]
struct JsonMatch<'a> {
    target: &'a str,
    method: &'a str,
    username: &'a str,
    reply: &'a str,
}

impl OutputSink {
    pub fn new(cfg: OutputConfig, writer: Box<dyn Write + Send>) -> Self {
        Self {
            cfg,
            writer: BufWriter::new(writer),
        }
    }

    pub fn write_match(&mut self, found: &Match) -> anyhow::Result<()> {
        match self.cfg.format {
            OutputFormat::Pretty => {
                if self.cfg.verbose {
                    writeln!(self.writer, "{}\t\t{}", found.username, found.reply)?;
                } else {
                    writeln!(self.writer, "{}", found.username)?;
                }
            }
            OutputFormat::Jsonl => {
                let line = serde_json::to_string(&JsonMatch {
                    target: &found.target,
                    method: found.method.verb(),
                    username: &found.username,
                    reply: &found.reply,
                })?;
                writeln!(self.writer, "{line}")?;
            }
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn flush(&mut self) {
        let _ = self.writer.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Method;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn root_match() -> Match {
        Match {
            target: "mx:25".into(),
            method: Method::Vrfy,
            username: "root".into(),
            reply: "250 2.1.5 root".into(),
        }
    }

    fn render(format: OutputFormat, verbose: bool) -> String {
        let buf = Shared::default();
        let mut sink = OutputSink::new(OutputConfig { format, verbose }, Box::new(buf.clone()));
        sink.write_match(&root_match()).unwrap();
        let bytes = buf.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn terse_prints_username_only() {
        assert_eq!(render(OutputFormat::Pretty, false), "root\n");
    }

    #[test]
    fn verbose_appends_reply() {
        assert_eq!(render(OutputFormat::Pretty, true), "root\t\t250 2.1.5 root\n");
    }

    #[test]
    fn jsonl_emits_one_object_per_line() {
        let out = render(OutputFormat::Jsonl, false);
        let value: serde_json::Value = serde_json::from_str(out.trim_end()).unwrap();
        assert_eq!(value["username"], "root");
        assert_eq!(value["method"], "VRFY");
        assert_eq!(value["reply"], "250 2.1.5 root");
    }
}
