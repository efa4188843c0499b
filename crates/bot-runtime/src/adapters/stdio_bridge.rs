//! # Wallet Bridge
//!
//! Newline-delimited JSON between the wallet process and the chat bus.
//!
//! Inbound (stdin):
//!
//! ```text
//! {"event":"paired","device":"0DEVICE"}
//! {"event":"text","device":"0DEVICE","text":"stats"}
//! ```
//!
//! Outbound (stdout):
//!
//! ```text
//! {"event":"text","device":"0DEVICE","body":"..."}
//! ```

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use shared_bus::{ChatEvent, EventPublisher, Subscription};
use shared_types::entities::DeviceAddress;

/// One line read from the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum InboundLine {
    Paired { device: DeviceAddress },
    Text { device: DeviceAddress, text: String },
}

impl From<InboundLine> for ChatEvent {
    fn from(line: InboundLine) -> Self {
        match line {
            InboundLine::Paired { device } => ChatEvent::Paired { device },
            InboundLine::Text { device, text } => ChatEvent::text_received(device, text),
        }
    }
}

/// One line written to the wallet.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum OutboundLine<'a> {
    Text {
        device: &'a DeviceAddress,
        body: &'a str,
    },
}

/// Parse one inbound line. Blank lines yield `Ok(None)`.
pub fn parse_inbound_line(line: &str) -> Result<Option<InboundLine>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}

/// Publish every line of `reader` on the bus until EOF.
///
/// Malformed lines are logged and skipped. Returns the number of events
/// published.
pub async fn pump_inbound<R, P>(reader: R, bus: &P) -> std::io::Result<u64>
where
    R: AsyncBufRead + Unpin,
    P: EventPublisher + ?Sized,
{
    let mut lines = reader.lines();
    let mut published = 0u64;
    let mut line_no = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        match parse_inbound_line(&line) {
            Ok(Some(inbound)) => {
                let event = ChatEvent::from(inbound);
                debug!(device = %event.device(), line = line_no, "Inbound event");
                bus.publish(event).await;
                published += 1;
            }
            Ok(None) => {}
            Err(e) => warn!(line = line_no, error = %e, "Skipping malformed inbound line"),
        }
    }

    info!(published, "Inbound stream closed");
    Ok(published)
}

/// Write every outbound event from `subscription` to `writer`.
///
/// Stops when the bus closes, or when `stop` fires after writing what is
/// still buffered. Returns the number of lines written.
pub async fn pump_outbound<W>(
    mut writer: W,
    mut subscription: Subscription,
    mut stop: watch::Receiver<bool>,
) -> std::io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;

    loop {
        tokio::select! {
            event = subscription.recv() => match event {
                Some(event) => written += write_outbound(&mut writer, &event).await?,
                None => break,
            },
            _ = stop.changed() => {
                while let Some(event) = subscription.try_recv() {
                    written += write_outbound(&mut writer, &event).await?;
                }
                break;
            }
        }
    }

    debug!(written, "Outbound stream finished");
    Ok(written)
}

/// Write one reply line. Other events are skipped; returns the lines written.
async fn write_outbound<W>(writer: &mut W, event: &ChatEvent) -> std::io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let ChatEvent::TextOutbound { device, body } = event else {
        return Ok(0);
    };
    let mut line = serde_json::to_string(&OutboundLine::Text { device, body })
        .map_err(std::io::Error::other)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(1)
}
