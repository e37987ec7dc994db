//! NDJSON (newline-delimited JSON) notification sink.
//!
//! ```ignore
//! let sink = JsonStreamPublisher::stdout();
//! sink.publish(&notification).await?;
//! ```

use super::{Notification, Publisher};
use async_trait::async_trait;
use geofence_core::error::{GeofenceError, GeofenceResult};
use std::io::{self, BufWriter, Write};
use std::sync::Mutex;

/// Writes one `{"channel", "message"}` line per notification.
///
/// Each line is flushed as it is written so a downstream reader sees
/// events as they happen.
pub struct JsonStreamPublisher<W: Write + Send> {
    writer: Mutex<BufWriter<W>>,
}

impl JsonStreamPublisher<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> JsonStreamPublisher<W> {
    /// Create a sink wrapping any writer (file, Vec<u8>, etc.).
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
        }
    }

    fn write_line(&self, notification: &Notification) -> io::Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "sink lock poisoned"))?;
        serde_json::to_writer(&mut *writer, notification)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(self) -> io::Result<W> {
        let writer = self
            .writer
            .into_inner()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "sink lock poisoned"))?;
        writer.into_inner().map_err(|e| e.into_error())
    }
}

#[async_trait]
impl<W: Write + Send> Publisher for JsonStreamPublisher<W> {
    async fn publish(&self, notification: &Notification) -> GeofenceResult<()> {
        self.write_line(notification).map_err(|e| {
            GeofenceError::Publish(format!("Failed to write {}: {e}", notification.channel))
        })
    }
}
