// src/console.rs
//
// Headless front end. Link events go to stdout as one JSON object per line;
// intents are read from stdin in the same shape:
//
//   {"type":"MOTOR","state":true}
//   {"type":"FREQ","state":75}
//
// Closing stdin shuts the supervisor down.

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::device_scan::SystemPortLister;
use crate::io::serial::SerialOpener;
use crate::logging;
use crate::messages::{ChannelSink, Intent, SinkEvent};
use crate::settings::{self, LinkSettings};
use crate::supervisor::LinkSupervisor;

/// Frequency range the UI accepts, in Hz.
pub const FREQUENCY_RANGE: std::ops::RangeInclusive<u32> = 40..=120;

/// Reject intents a user should not be able to send.
pub fn validate_intent(intent: &Intent) -> Result<(), String> {
    match *intent {
        Intent::Freq { state } if !FREQUENCY_RANGE.contains(&state) => Err(format!(
            "Frequency {} Hz out of range ({}-{} Hz)",
            state,
            FREQUENCY_RANGE.start(),
            FREQUENCY_RANGE.end()
        )),
        _ => Ok(()),
    }
}

/// Parse one stdin line. Blank lines yield `Ok(None)`.
pub fn parse_intent_line(line: &str) -> Result<Option<Intent>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let intent: Intent =
        serde_json::from_str(line).map_err(|e| format!("Invalid message '{}': {}", line, e))?;
    validate_intent(&intent)?;
    Ok(Some(intent))
}

pub fn format_event(event: &SinkEvent) -> Result<String, String> {
    serde_json::to_string(event).map_err(|e| format!("Failed to serialize event: {}", e))
}

/// Load settings, then run the supervisor until stdin closes.
pub fn run_console() -> Result<(), String> {
    let settings_path = settings::default_settings_path();
    let link_settings = settings::load_settings(&settings_path)?;

    if let Some(dir) = link_settings.log_dir.as_deref() {
        if let Err(e) = logging::init_file_logging(std::path::Path::new(dir)) {
            tlog!("[console] {}", e);
        }
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start runtime: {}", e))?;

    let result = runtime.block_on(serve(link_settings));
    logging::stop_file_logging();
    result
}

async fn serve(link_settings: LinkSettings) -> Result<(), String> {
    let config = link_settings.supervisor_config()?;
    let (sink, mut events) = ChannelSink::new();

    let (handle, supervisor_task) = LinkSupervisor::spawn(
        config,
        Arc::new(SystemPortLister),
        Arc::new(SerialOpener),
        Arc::new(sink),
    );

    let printer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(event) = events.recv().await {
            let line = match format_event(&event) {
                Ok(line) => line,
                Err(e) => {
                    tlog!("[console] {}", e);
                    continue;
                }
            };
            if stdout.write_all(format!("{}\n", line).as_bytes()).await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_intent_line(&line) {
                Ok(Some(intent)) => handle.submit(intent).await?,
                Ok(None) => {}
                Err(e) => tlog!("[console] {}", e),
            },
            Ok(None) => break,
            Err(e) => {
                tlog!("[console] Failed to read stdin: {}", e);
                break;
            }
        }
    }

    tlog!("[console] Input closed, shutting down");
    handle.shutdown().await;
    drop(handle);
    supervisor_task
        .await
        .map_err(|e| format!("Supervisor task failed: {}", e))?;
    // The supervisor owned the last sink, so the printer drains and exits
    let _ = tokio::time::timeout(Duration::from_millis(500), printer).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_range_boundaries() {
        assert!(validate_intent(&Intent::Freq { state: 40 }).is_ok());
        assert!(validate_intent(&Intent::Freq { state: 120 }).is_ok());
        assert!(validate_intent(&Intent::Freq { state: 39 }).is_err());
        assert!(validate_intent(&Intent::Freq { state: 121 }).is_err());
        assert!(validate_intent(&Intent::Motor { state: true }).is_ok());
    }

    #[test]
    fn test_parse_intent_line() {
        assert_eq!(
            parse_intent_line(r#" {"type":"FREQ","state":75} "#).unwrap(),
            Some(Intent::Freq { state: 75 })
        );
        assert_eq!(
            parse_intent_line(r#"{"type":"MOTOR","state":false}"#).unwrap(),
            Some(Intent::Motor { state: false })
        );
        assert_eq!(parse_intent_line("   ").unwrap(), None);
    }

    #[test]
    fn test_parse_intent_line_rejects() {
        let err = parse_intent_line(r#"{"type":"FREQ","state":1075}"#).unwrap_err();
        assert!(err.contains("out of range"));
        assert!(parse_intent_line("MOTOR on").is_err());
    }

    #[test]
    fn test_format_event() {
        assert_eq!(
            format_event(&SinkEvent::Arm { state: false }).unwrap(),
            r#"{"type":"ARM","state":false}"#
        );
    }
}
