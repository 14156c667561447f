//! Async pumps over the probe subprocess streams
//!
//! One task per stream. Stdout pumps run a [`BlockParser`] and push decoded
//! events to a bounded channel; stderr pumps filter tracer diagnostics onto
//! the shared error channel. A full channel blocks the pump, which in turn
//! lets the OS pipe fill up and the tracer's own buffering absorb the stall.

use log::debug;
use memtrack_common::ProbeKind;
use std::borrow::Cow;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc::Sender;

use super::block_parser::{is_reportable_diagnostic, BlockParser, DecodeRecord};
use crate::domain::ProbeError;

/// Read records from a probe's stdout until it closes.
///
/// Malformed records are reported and skipped; parsing resumes at the next
/// start sentinel. Returns early once the session has dropped its receivers.
pub async fn pump_records<R, E>(mut reader: R, events: Sender<E>, errors: Sender<ProbeError>)
where
    R: AsyncBufRead + Unpin,
    E: DecodeRecord,
{
    let mut parser = BlockParser::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                debug!("{} probe stdout closed", E::KIND);
                return;
            }
            Ok(_) => {
                let Some(body) = parser.push_line(&trim_line(&buf)) else {
                    continue;
                };
                let delivered = match E::decode(&body) {
                    Ok(event) => events.send(event).await.is_ok(),
                    Err(source) => {
                        errors.send(ProbeError::Parse { probe: E::KIND, source }).await.is_ok()
                    }
                };
                if !delivered {
                    return;
                }
            }
            Err(source) => {
                let _ = errors
                    .send(ProbeError::Stream { probe: E::KIND, stream: "stdout", source })
                    .await;
                return;
            }
        }
    }
}

/// Forward every stderr line except routine debuginfo noise.
pub async fn pump_diagnostics<R>(mut reader: R, probe: ProbeKind, errors: Sender<ProbeError>)
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                debug!("{probe} probe stderr closed");
                return;
            }
            Ok(_) => {
                let line = trim_line(&buf);
                if !is_reportable_diagnostic(&line) {
                    continue;
                }
                let err = ProbeError::Diagnostic { probe, line: line.into_owned() };
                if errors.send(err).await.is_err() {
                    return;
                }
            }
            Err(source) => {
                let _ = errors.send(ProbeError::Stream { probe, stream: "stderr", source }).await;
                return;
            }
        }
    }
}

/// Strip the line terminator; frames may carry non-UTF-8 symbol bytes
fn trim_line(raw: &[u8]) -> Cow<'_, str> {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw)
}
