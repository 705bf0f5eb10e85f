//! Event sinks for the invoking system.

use async_trait::async_trait;
use benchline_core::Result;
use benchline_core::events::Event;
use benchline_core::ports::EventSink;
use std::io::Write;
use std::sync::Mutex;
use tracing::info;

/// Logs every event.
pub struct TracingSink;

#[async_trait]
impl EventSink for TracingSink {
    async fn publish(&self, event: Event) -> Result<()> {
        info!(subject = %event.subject(), run_id = %event.run_id(), "Event");
        Ok(())
    }
}

/// Writes every event as one JSON line.
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl JsonLinesSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    async fn publish(&self, event: Event) -> Result<()> {
        let line = serde_json::to_string(&event)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| benchline_core::Error::Internal("event writer poisoned".to_string()))?;
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}
