// Link-quality telemetry over the AT-command sub-protocol
//
// Each cycle enters command mode with the escape sequence, queries the
// received signal strength, echoes the reading back over the link and leaves
// command mode again. Responses are framed by a carriage return, a 1500 ms
// idle timeout or the 32 byte limit, whichever comes first.

use std::borrow::Cow;
use std::fmt;
use std::io;

use tracing::{debug, info, warn};

use crate::config::{
    AT_ESCAPE, AT_EXIT, AT_OK, AT_QUERY_RSSI, DEGRADED_AFTER, DRAIN_POLL, FRAME_IDLE_TIMEOUT,
    FRAME_MAX_LEN, FRAME_TERMINATOR,
};
use crate::link::Link;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("IO error during telemetry poll: {0}")]
    Io(#[from] io::Error),
}

/// One bounded response, terminator stripped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryFrame {
    bytes: Vec<u8>,
}

impl TelemetryFrame {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let len = bytes.len().min(FRAME_MAX_LEN);
        Self {
            bytes: bytes[..len].to_vec(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    /// Control acknowledgement rather than a value
    pub fn is_ok(&self) -> bool {
        self.bytes == AT_OK.as_bytes()
    }

    /// Interpret the frame as a base-16 reading
    ///
    /// Unlike a lenient strtol, empty or non-hex content is reported as
    /// `None` instead of a reading of zero.
    pub fn parse_hex(&self) -> Option<u32> {
        let text = std::str::from_utf8(&self.bytes).ok()?.trim();
        if text.is_empty() || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        u32::from_str_radix(text, 16).ok()
    }
}

/// Received signal strength, magnitude in dBm below zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalStrength(pub u32);

impl fmt::Display for SignalStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "-{} dBm", self.0)
    }
}

/// Result of one telemetry cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Reading(SignalStrength),
    /// Query answered with a bare acknowledgement
    NoValue,
    /// Query answered with content that is not a hex number
    Unparseable(String),
    /// Escape sequence was not acknowledged; nothing was queried
    NoCommandMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkHealth {
    Ok,
    Degraded,
}

/// Read bytes until CR, idle timeout or the frame limit
pub fn read_frame<L: Link + ?Sized>(link: &mut L) -> io::Result<TelemetryFrame> {
    let mut bytes = Vec::with_capacity(FRAME_MAX_LEN);
    while bytes.len() < FRAME_MAX_LEN && link.wait_for_data(FRAME_IDLE_TIMEOUT)? {
        let byte = link.read_byte()?;
        if byte == FRAME_TERMINATOR {
            break;
        }
        bytes.push(byte);
    }
    Ok(TelemetryFrame { bytes })
}

/// Discard whatever is currently buffered on the link
pub fn drain<L: Link + ?Sized>(link: &mut L) -> io::Result<usize> {
    let mut discarded = 0;
    while link.wait_for_data(DRAIN_POLL)? {
        link.read_byte()?;
        discarded += 1;
    }
    if discarded > 0 {
        debug!("Drained {} stale bytes", discarded);
    }
    Ok(discarded)
}

/// Drain, flush, write `cmd` and read the response frame
pub fn send_command<L: Link + ?Sized>(link: &mut L, cmd: &str) -> io::Result<TelemetryFrame> {
    drain(link)?;
    link.flush()?;
    link.write_all(cmd.as_bytes())?;
    let frame = read_frame(link)?;
    debug!("{:?} -> {:?}", cmd, frame.text());
    Ok(frame)
}

/// Polls link quality and keeps track of link health across cycles
#[derive(Debug)]
pub struct TelemetryPoller {
    health: LinkHealth,
    misses: u32,
    last_reading: Option<SignalStrength>,
}

impl Default for TelemetryPoller {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryPoller {
    pub fn new() -> Self {
        Self {
            health: LinkHealth::Ok,
            misses: 0,
            last_reading: None,
        }
    }

    pub fn health(&self) -> LinkHealth {
        self.health
    }

    pub fn last_reading(&self) -> Option<SignalStrength> {
        self.last_reading
    }

    /// Run one full cycle and log its result
    pub fn poll<L: Link + ?Sized>(&mut self, link: &mut L) -> Result<PollOutcome, TelemetryError> {
        debug!("Reading rssi");
        let result = self.query(link);
        match &result {
            Ok(PollOutcome::Reading(rssi)) => {
                info!("RSSI: {}", rssi);
                self.last_reading = Some(*rssi);
            }
            Ok(PollOutcome::NoValue) => debug!("RSSI query acknowledged without a value"),
            Ok(PollOutcome::Unparseable(text)) => warn!("Unparseable RSSI response: {:?}", text),
            Ok(PollOutcome::NoCommandMode) => debug!("Radio did not enter command mode"),
            Err(e) => warn!("Telemetry cycle failed: {}", e),
        }
        self.update_health(matches!(result, Ok(PollOutcome::Reading(_))));
        result
    }

    fn query<L: Link + ?Sized>(&mut self, link: &mut L) -> Result<PollOutcome, TelemetryError> {
        if !send_command(link, AT_ESCAPE)?.is_ok() {
            return Ok(PollOutcome::NoCommandMode);
        }

        let outcome = Self::read_rssi(link);

        // Leave command mode even when the query itself went wrong
        let exit = send_command(link, AT_EXIT);
        let outcome = outcome?;
        exit?;
        Ok(outcome)
    }

    fn read_rssi<L: Link + ?Sized>(link: &mut L) -> Result<PollOutcome, TelemetryError> {
        let frame = send_command(link, AT_QUERY_RSSI)?;
        if frame.is_ok() {
            return Ok(PollOutcome::NoValue);
        }

        let text = frame.text().into_owned();
        link.write_all(format!("0x{}\r\n", text).as_bytes())?;

        Ok(match frame.parse_hex() {
            Some(value) => PollOutcome::Reading(SignalStrength(value)),
            None => PollOutcome::Unparseable(text),
        })
    }

    fn update_health(&mut self, got_reading: bool) {
        if got_reading {
            self.misses = 0;
            if self.health == LinkHealth::Degraded {
                info!("Link quality readings restored");
            }
            self.health = LinkHealth::Ok;
            return;
        }

        self.misses = self.misses.saturating_add(1);
        if self.misses >= DEGRADED_AFTER && self.health != LinkHealth::Degraded {
            warn!("No link quality reading for {} polls, link degraded", self.misses);
            self.health = LinkHealth::Degraded;
        }
    }
}
