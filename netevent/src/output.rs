use std::io::{self, Write};

use anyhow::Error;
use async_trait::async_trait;
use netevent_userspace_common::{EventRecord, EventSink};

use crate::config::OutputFormat;

/// Writes one line per record to stdout. Logs go to stderr, so stdout
/// carries nothing but records.
pub struct StdoutSink {
    format: OutputFormat,
}

impl StdoutSink {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }
}

#[async_trait]
impl EventSink for StdoutSink {
    async fn emit(&self, record: &EventRecord) -> Result<(), Error> {
        let line = render(self.format, record)?;
        writeln!(io::stdout().lock(), "{}", line)?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), Error> {
        io::stdout().flush()?;
        Ok(())
    }
}

pub fn render(format: OutputFormat, record: &EventRecord) -> Result<String, Error> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string(record)?,
        OutputFormat::Hex => format!("{} {} {}", record.seq, record.len, record.hex()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::Value;

    #[test]
    fn json_line_is_a_single_object() {
        let record = EventRecord::new(3, Bytes::from_static(b"\xde\xad\xbe\xef"));
        let line = render(OutputFormat::Json, &record).unwrap();
        assert!(!line.contains('\n'));

        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["seq"], 3);
        assert_eq!(value["len"], 4);
        assert_eq!(value["data"], "3q2+7w==");
    }

    #[test]
    fn hex_line_has_seq_len_and_payload() {
        let record = EventRecord::new(12, Bytes::from_static(b"\x01\x02\xff"));
        assert_eq!(render(OutputFormat::Hex, &record).unwrap(), "12 3 0102ff");
    }
}
