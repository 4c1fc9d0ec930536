//! Connection and session management for ELM327 adapters
//!
//! A [`Connection`] owns one transport, walks the adapter through the
//! handshake and protocol selection, discovers which commands the vehicle
//! answers, and then serves [`Connection::query`] calls one at a time.

use crate::command::{registry, Command, ParameterId, ENGINE_HEADER};
use crate::decode::{DecodeContext, DecodedValue};
use crate::error::{ObdError, TransportError};
use crate::mode;
use crate::protocol::{AdapterSignal, EcuAddress, EcuMap, EcuRole, Message, ObdProtocol, Protocol};
use crate::transport::{response_lines, Transport};
use crate::units::UnitsPreference;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Pause after waking the adapter from low power
const WAKE_DELAY: Duration = Duration::from_secs(1);

/// Logical state of the adapter and the vehicle bus behind it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum ConnectionStatus {
    NotConnected = 0,
    ElmConnected = 1,
    ObdConnected = 2,
    CarConnected = 3,
    Errored = 4,
}

impl ConnectionStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionStatus::ElmConnected,
            2 => ConnectionStatus::ObdConnected,
            3 => ConnectionStatus::CarConnected,
            4 => ConnectionStatus::Errored,
            _ => ConnectionStatus::NotConnected,
        }
    }

    /// A protocol is selected and queries may be sent
    pub fn can_query(&self) -> bool {
        matches!(self, ConnectionStatus::ObdConnected | ConnectionStatus::CarConnected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionStatus::NotConnected => "Not Connected",
            ConnectionStatus::ElmConnected => "ELM Connected",
            ConnectionStatus::ObdConnected => "OBD Connected",
            ConnectionStatus::CarConnected => "Car Connected",
            ConnectionStatus::Errored => "Errored",
        };
        f.write_str(name)
    }
}

/// Settings for [`Connection::connect`] and subsequent queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectOptions {
    /// Explicit protocol or automatic detection
    pub protocol: ObdProtocol,
    /// Per-query response timeout
    pub timeout_ms: u64,
    /// Timeout for `ATZ` and the protocol search
    pub reset_timeout_ms: u64,
    /// Extra attempts after an unparseable response
    pub retries: u32,
    /// Append the expected frame count to repeated requests
    pub fast: bool,
    /// Refuse to connect when the supply voltage is outside the bounds
    pub check_voltage: bool,
    pub min_voltage: f64,
    pub max_voltage: f64,
    /// The adapter may be asleep; wake it before the reset
    pub start_low_power: bool,
    pub units: UnitsPreference,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            protocol: ObdProtocol::Auto,
            timeout_ms: 2000,
            reset_timeout_ms: 5000,
            retries: 1,
            fast: false,
            check_voltage: false,
            min_voltage: 6.0,
            max_voltage: 16.0,
            start_low_power: false,
            units: UnitsPreference::Metric,
        }
    }
}

impl ConnectOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

/// One decoded reply, normally one per answering ECU
#[derive(Debug, Clone)]
pub struct DecodedResponse {
    pub command: Command,
    pub value: DecodedValue,
    /// `None` when nothing answered
    pub ecu: Option<EcuAddress>,
    pub role: EcuRole,
    pub message: Option<Message>,
    /// Adapter status lines seen alongside the reply
    pub signals: Vec<AdapterSignal>,
    /// The vehicle advertised support for this command
    pub confirmed: bool,
    pub timestamp_ms: u64,
}

impl DecodedResponse {
    pub fn is_no_data(&self) -> bool {
        self.value.is_no_data()
    }
}

/// State guarded by the transport lock
struct Session {
    transport: Box<dyn Transport>,
    protocol: Option<Protocol>,
    low_power: bool,
    /// A request was written and its prompt has not been read yet
    awaiting_prompt: bool,
    /// Header last accepted by `ATSH`
    header: &'static str,
    /// Last non-empty line written, repeated by a bare `\r`
    last_request: Option<String>,
}

impl Session {
    fn reset(&mut self) {
        self.protocol = None;
        self.awaiting_prompt = false;
        self.header = ENGINE_HEADER;
        self.last_request = None;
    }
}

/// Read-mostly facts about the adapter and the vehicle
#[derive(Debug, Default)]
struct SessionInfo {
    elm_version: Option<String>,
    protocol: Option<ObdProtocol>,
    ecus: EcuMap,
    supported: BTreeSet<(u8, ParameterId)>,
    frame_counts: HashMap<(u8, ParameterId), usize>,
}

pub struct Connection {
    session: Mutex<Session>,
    info: RwLock<SessionInfo>,
    status: AtomicU8,
    options: ConnectOptions,
    ctx: DecodeContext,
}

impl Connection {
    /// Wrap an open transport; nothing is sent until [`Connection::connect`]
    pub fn new(transport: Box<dyn Transport>, options: ConnectOptions) -> Self {
        let ctx = DecodeContext {
            units: options.units,
        };
        Self {
            session: Mutex::new(Session {
                transport,
                protocol: None,
                low_power: false,
                awaiting_prompt: false,
                header: ENGINE_HEADER,
                last_request: None,
            }),
            info: RwLock::new(SessionInfo::default()),
            status: AtomicU8::new(ConnectionStatus::NotConnected as u8),
            options,
            ctx,
        }
    }

    /// Create and connect in one step
    pub async fn open(transport: Box<dyn Transport>, options: ConnectOptions) -> Result<Self, ObdError> {
        let connection = Self::new(transport, options);
        connection.connect().await?;
        Ok(connection)
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: ConnectionStatus) {
        let previous = ConnectionStatus::from_u8(self.status.swap(status as u8, Ordering::AcqRel));
        if previous != status {
            info!("Connection status: {} -> {}", previous, status);
        }
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    /// Run the handshake, select a protocol and discover supported commands
    pub async fn connect(&self) -> Result<(), ObdError> {
        let mut session = self.session.lock().await;
        match self.status() {
            ConnectionStatus::ObdConnected | ConnectionStatus::CarConnected => return Ok(()),
            ConnectionStatus::Errored => return Err(ObdError::NotConnected),
            ConnectionStatus::NotConnected => self.handshake(&mut session).await?,
            ConnectionStatus::ElmConnected => {}
        }

        if self.options.check_voltage {
            let volts = self.read_voltage(&mut session).await?;
            if !(self.options.min_voltage..=self.options.max_voltage).contains(&volts) {
                warn!("Vehicle voltage {:.2} V out of range", volts);
                return Err(ObdError::VoltageOutOfRange(volts));
            }
        }

        self.select_protocol(&mut session).await?;
        self.discover_supported(&mut session).await?;
        Ok(())
    }

    /// Reset the adapter and configure its output format
    async fn handshake(&self, session: &mut Session) -> Result<(), ObdError> {
        if self.options.start_low_power {
            self.wake(session).await?;
        }

        let lines = self.send(session, "ATZ", self.options.reset_timeout()).await?;
        let Some(version) = lines.iter().find(|l| l.contains("ELM")).cloned() else {
            warn!("Adapter did not identify itself: {:?}", lines);
            return Err(ObdError::AdapterUnresponsive(format!(
                "ATZ answered {lines:?}"
            )));
        };
        info!("Adapter identified as {}", version);
        session.header = ENGINE_HEADER;

        // Echo may still be on for this one reply
        let lines = self.send(session, "ATE0", self.options.timeout()).await?;
        if !lines.iter().any(|l| l.contains("OK")) {
            return Err(ObdError::AdapterUnresponsive(format!("ATE0 answered {lines:?}")));
        }
        for command in ["ATH1", "ATL0"] {
            let lines = self.send(session, command, self.options.timeout()).await?;
            if lines != ["OK"] {
                return Err(ObdError::AdapterUnresponsive(format!(
                    "{command} answered {lines:?}"
                )));
            }
        }

        self.info.write().elm_version = Some(version);
        self.set_status(ConnectionStatus::ElmConnected);
        Ok(())
    }

    async fn select_protocol(&self, session: &mut Session) -> Result<(), ObdError> {
        let selected = match self.options.protocol {
            ObdProtocol::Auto => self.auto_protocol(session).await?,
            manual => self.manual_protocol(session, manual).await?,
        };
        let (protocol, messages) = selected;
        let ecus = EcuMap::from_messages(protocol.kind(), &messages);
        info!(
            "Using protocol {} with {} ECU(s)",
            protocol.kind(),
            ecus.len()
        );
        {
            let mut info = self.info.write();
            info.protocol = Some(protocol.kind());
            info.ecus = ecus;
        }
        session.protocol = Some(protocol);
        self.set_status(ConnectionStatus::ObdConnected);
        Ok(())
    }

    async fn manual_protocol(
        &self,
        session: &mut Session,
        kind: ObdProtocol,
    ) -> Result<(Protocol, Vec<Message>), ObdError> {
        self.send(session, &kind.to_elm_command(), self.options.timeout())
            .await?;
        let lines = self.send(session, "0100", self.options.reset_timeout()).await?;
        let protocol = Protocol::new(kind)?;
        let parsed = protocol.parse(&lines);
        if parsed.signals.contains(&AdapterSignal::UnableToConnect) {
            return Err(ObdError::ProtocolDetectionFailed(format!(
                "{kind} is unable to connect"
            )));
        }
        Ok((protocol, parsed.messages))
    }

    async fn auto_protocol(&self, session: &mut Session) -> Result<(Protocol, Vec<Message>), ObdError> {
        self.send(session, "ATSP0", self.options.timeout()).await?;
        let lines = self.send(session, "0100", self.options.reset_timeout()).await?;
        let dpn = self.send(session, "ATDPN", self.options.timeout()).await?;
        let detected = dpn
            .first()
            .map(|line| line.strip_prefix('A').filter(|id| !id.is_empty()).unwrap_or(line.as_str()))
            .and_then(|id| {
                let mut chars = id.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => ObdProtocol::from_elm_id(c),
                    _ => None,
                }
            })
            .filter(|kind| *kind != ObdProtocol::Auto);
        if let Some(kind) = detected {
            if let Some(found) = accept_reply(kind, &lines) {
                return Ok(found);
            }
            debug!("Adapter reported {} but 0100 was not answered", kind);
        }

        for kind in ObdProtocol::AUTO_ORDER {
            debug!("Trying protocol {}", kind);
            self.send(session, &kind.try_command(), self.options.timeout())
                .await?;
            let lines = self.send(session, "0100", self.options.reset_timeout()).await?;
            if let Some(found) = accept_reply(kind, &lines) {
                return Ok(found);
            }
        }
        warn!("No protocol answered 0100");
        Err(ObdError::ProtocolDetectionFailed(
            "no candidate protocol answered 0100".to_string(),
        ))
    }

    /// Query the supported-PID getters and record what the vehicle answers
    async fn discover_supported(&self, session: &mut Session) -> Result<(), ObdError> {
        let reg = registry();
        {
            let mut info = self.info.write();
            info.supported = reg.base_commands().iter().map(|c| c.key()).collect();
        }
        let is_can = session.protocol.as_ref().is_some_and(Protocol::is_can);

        for getter in reg.pid_getters() {
            if getter.can_only && !is_can {
                continue;
            }
            if !self.info.read().supported.contains(&getter.key()) {
                continue;
            }
            let responses = self.run_query(session, getter).await;
            let responses = match responses {
                Ok(r) => r,
                Err(ObdError::ProtocolError { command, detail }) => {
                    debug!("{} failed during discovery: {}", command, detail);
                    continue;
                }
                Err(e) => return Err(e),
            };
            let mut info = self.info.write();
            for response in responses {
                let DecodedValue::PidSupport(support) = response.value else {
                    continue;
                };
                let base = match getter.pid {
                    ParameterId::Byte(b) => b,
                    _ => continue,
                };
                for pid in support.supported(base) {
                    if let Some(cmd) = reg.get(getter.mode, ParameterId::Byte(pid)) {
                        info.supported.insert(cmd.key());
                    }
                    if getter.mode == mode::CURRENT_DATA {
                        if let Some(mirror) = reg.get(mode::FREEZE_FRAME, ParameterId::Byte(pid)) {
                            info.supported.insert(mirror.key());
                        }
                    }
                }
            }
        }
        info!(
            "{} command(s) supported by the vehicle",
            self.info.read().supported.len()
        );
        Ok(())
    }

    /// Send a command and decode every reply.
    ///
    /// Silence from the vehicle is reported as a single
    /// [`DecodedValue::NoData`] response, never as an error.
    pub async fn query(&self, command: &Command) -> Result<Vec<DecodedResponse>, ObdError> {
        let mut session = self.session.lock().await;
        if !self.status().can_query() {
            return Err(ObdError::NotConnected);
        }
        self.run_query(&mut session, command).await
    }

    /// Resolve a command name or `mode:pid` string, then query it
    pub async fn query_named(&self, name: &str) -> Result<Vec<DecodedResponse>, ObdError> {
        let command = registry().resolve(name)?;
        self.query(command).await
    }

    async fn run_query(
        &self,
        session: &mut Session,
        command: &Command,
    ) -> Result<Vec<DecodedResponse>, ObdError> {
        if session.low_power {
            self.wake(session).await?;
        }
        let key = command.key();
        let (confirmed, frame_count) = {
            let info = self.info.read();
            (info.supported.contains(&key), info.frame_counts.get(&key).copied())
        };
        if !confirmed {
            debug!("{} is not confirmed as supported", command.name);
        }
        let Some(is_can) = session.protocol.as_ref().map(Protocol::is_can) else {
            return Err(ObdError::NotConnected);
        };
        if command.can_only && !is_can {
            debug!("{} is only defined on CAN buses", command.name);
            return Ok(vec![self.no_data(command, Vec::new(), confirmed)]);
        }

        self.set_header(session, command.header()).await?;

        let use_fast = self.options.fast && command.fast;
        let mut request = match frame_count {
            Some(n) if use_fast => command.request_with_frames(n),
            _ => command.request(),
        };
        // The adapter repeats its last command on an empty line
        if self.options.fast && session.last_request.as_deref() == Some(request.as_str()) {
            request.clear();
        }

        let mut last_error = None;
        for attempt in 0..=self.options.retries {
            if attempt > 0 {
                debug!("Retrying {} (attempt {})", command.name, attempt + 1);
            }
            let lines = self.send(session, &request, self.options.timeout()).await?;
            let Some(protocol) = session.protocol.as_ref() else {
                return Err(ObdError::NotConnected);
            };
            let parsed = protocol.parse(&lines);

            if parsed.messages.is_empty() {
                if parsed.dropped == 0 && !parsed.has_error_signal() {
                    return Ok(vec![self.no_data(command, parsed.signals, confirmed)]);
                }
                last_error = Some(format!(
                    "{} unparseable frame(s), signals {:?}",
                    parsed.dropped, parsed.signals
                ));
                continue;
            }

            let ecus = self.info.read().ecus.clone();
            let timestamp_ms = now_ms();
            let total_frames: usize = parsed.messages.iter().map(|m| m.frames.len()).sum();
            let mut responses = Vec::with_capacity(parsed.messages.len());
            for message in parsed.messages {
                match command.decode_message(&message.data, is_can, &self.ctx) {
                    Ok(value) => responses.push(DecodedResponse {
                        command: command.clone(),
                        value,
                        ecu: Some(message.source),
                        role: ecus.role(message.source),
                        message: Some(message),
                        signals: parsed.signals.clone(),
                        confirmed,
                        timestamp_ms,
                    }),
                    Err(e) => {
                        warn!("Discarding reply from {}: {}", message.source, e);
                        last_error = Some(e.to_string());
                    }
                }
            }
            if responses.is_empty() {
                continue;
            }

            if use_fast && frame_count.is_none() {
                self.info.write().frame_counts.insert(key, total_frames);
            }
            if responses.iter().any(|r| !r.is_no_data())
                && self.status() == ConnectionStatus::ObdConnected
            {
                self.set_status(ConnectionStatus::CarConnected);
            }
            return Ok(responses);
        }

        Err(ObdError::ProtocolError {
            command: command.name.to_string(),
            detail: last_error.unwrap_or_else(|| "no usable reply".to_string()),
        })
    }

    /// Address following requests to `header` unless it is already set
    async fn set_header(&self, session: &mut Session, header: &'static str) -> Result<(), ObdError> {
        if session.header == header {
            return Ok(());
        }
        let lines = self.send(session, &format!("ATSH {header}"), self.options.timeout()).await?;
        if lines == ["OK"] {
            debug!("Request header set to {}", header);
            session.header = header;
        } else {
            warn!("ATSH {} answered {:?}", header, lines);
        }
        Ok(())
    }

    fn no_data(&self, command: &Command, signals: Vec<AdapterSignal>, confirmed: bool) -> DecodedResponse {
        DecodedResponse {
            command: command.clone(),
            value: DecodedValue::NoData,
            ecu: None,
            role: EcuRole::Unknown,
            message: None,
            signals,
            confirmed,
            timestamp_ms: now_ms(),
        }
    }

    /// Write one request and collect the reply lines.
    ///
    /// A reply left unread by a timeout or a cancelled query is drained
    /// first so it cannot be taken for the answer to this request. If its
    /// prompt never shows up, nothing is written and the request fails with
    /// [`ObdError::AdapterUnresponsive`]; the next request drains again.
    async fn send(&self, session: &mut Session, request: &str, timeout: Duration) -> Result<Vec<String>, ObdError> {
        if session.awaiting_prompt {
            self.drain_stale_reply(session, request).await?;
        }

        debug!("write: {:?}", request);
        let line = format!("{request}\r");
        self.transport_result(session.transport.write(line.as_bytes()).await)?;
        session.awaiting_prompt = true;
        if !request.is_empty() {
            session.last_request = Some(request.to_string());
        }

        let outcome = self.transport_result(session.transport.read_until_prompt(timeout).await)?;
        if outcome.prompt_seen {
            session.awaiting_prompt = false;
        } else {
            debug!("No prompt after {} within {:?}", request, timeout);
        }
        let lines = response_lines(&outcome.bytes);
        debug!("read: {:?}", lines);
        Ok(lines)
    }

    /// Wait for the prompt of an earlier request, up to the reset timeout
    async fn drain_stale_reply(&self, session: &mut Session, request: &str) -> Result<(), ObdError> {
        debug!("Draining stale reply before {:?}", request);
        let cap = self.options.reset_timeout().max(self.options.timeout());
        let stale = self.transport_result(session.transport.read_until_prompt(cap).await)?;
        if !stale.bytes.is_empty() {
            debug!("Discarded stale reply: {:?}", response_lines(&stale.bytes));
        }
        self.transport_result(session.transport.discard_input().await)?;
        if !stale.prompt_seen {
            warn!("Adapter still busy after {:?}; {:?} not sent", cap, request);
            return Err(ObdError::AdapterUnresponsive(format!(
                "no prompt for the previous request, {request:?} not sent"
            )));
        }
        session.awaiting_prompt = false;
        Ok(())
    }

    fn transport_result<T>(&self, result: Result<T, TransportError>) -> Result<T, ObdError> {
        result.map_err(|e| {
            warn!("Transport failure: {}", e);
            self.set_status(ConnectionStatus::Errored);
            ObdError::Transport(e)
        })
    }

    async fn read_voltage(&self, session: &mut Session) -> Result<f64, ObdError> {
        let lines = self.send(session, "ATRV", self.options.timeout()).await?;
        let Some(line) = lines.last() else {
            return Err(ObdError::malformed("ATRV returned nothing"));
        };
        line.trim_end_matches(['V', 'v'])
            .trim()
            .parse::<f64>()
            .map_err(|_| ObdError::malformed(format!("unreadable voltage {line:?}")))
    }

    async fn wake(&self, session: &mut Session) -> Result<(), ObdError> {
        debug!("Waking adapter");
        self.transport_result(session.transport.write(b" ").await)?;
        tokio::time::sleep(WAKE_DELAY).await;
        self.transport_result(session.transport.discard_input().await)?;
        session.low_power = false;
        session.last_request = None;
        Ok(())
    }

    /// Supply voltage measured by the adapter
    pub async fn adapter_voltage(&self) -> Result<f64, ObdError> {
        let mut session = self.session.lock().await;
        self.require_adapter()?;
        self.read_voltage(&mut session).await
    }

    /// Put the adapter to sleep; the next query wakes it
    pub async fn low_power(&self) -> Result<(), ObdError> {
        let mut session = self.session.lock().await;
        self.require_adapter()?;
        let lines = self.send(&mut session, "ATLP", self.options.timeout()).await?;
        if !lines.iter().any(|l| l.contains("OK")) {
            return Err(ObdError::ProtocolError {
                command: "ATLP".to_string(),
                detail: format!("answered {lines:?}"),
            });
        }
        session.low_power = true;
        info!("Adapter in low power mode");
        Ok(())
    }

    pub async fn normal_power(&self) -> Result<(), ObdError> {
        let mut session = self.session.lock().await;
        self.require_adapter()?;
        self.wake(&mut session).await
    }

    fn require_adapter(&self) -> Result<(), ObdError> {
        match self.status() {
            ConnectionStatus::NotConnected | ConnectionStatus::Errored => Err(ObdError::NotConnected),
            _ => Ok(()),
        }
    }

    /// Release the transport; later queries fail with [`ObdError::NotConnected`]
    pub async fn close(&self) -> Result<(), ObdError> {
        let mut session = self.session.lock().await;
        if session.header != ENGINE_HEADER && self.require_adapter().is_ok() {
            if let Err(e) = self.set_header(&mut session, ENGINE_HEADER).await {
                warn!("Could not restore the engine header: {}", e);
            }
        }
        session.reset();
        *self.info.write() = SessionInfo::default();
        self.set_status(ConnectionStatus::NotConnected);
        if session.transport.is_open() {
            session.transport.close().await?;
        }
        info!("Connection closed");
        Ok(())
    }

    pub fn elm_version(&self) -> Option<String> {
        self.info.read().elm_version.clone()
    }

    pub fn protocol(&self) -> Option<ObdProtocol> {
        self.info.read().protocol
    }

    pub fn ecus(&self) -> EcuMap {
        self.info.read().ecus.clone()
    }

    /// Commands the vehicle advertised, in registry order
    pub fn supported_commands(&self) -> Vec<&'static Command> {
        let info = self.info.read();
        registry()
            .iter()
            .filter(|c| info.supported.contains(&c.key()))
            .collect()
    }

    pub fn supports(&self, command: &Command) -> bool {
        self.info.read().supported.contains(&command.key())
    }
}

/// Parse a `0100` reply under `kind`, accepting it only if an ECU answered
fn accept_reply(kind: ObdProtocol, lines: &[String]) -> Option<(Protocol, Vec<Message>)> {
    let protocol = Protocol::new(kind).ok()?;
    let parsed = protocol.parse(lines);
    let refused = parsed.has_error_signal()
        || parsed.signals.contains(&AdapterSignal::NoData)
        || parsed.messages.is_empty();
    if refused {
        debug!("{} rejected: {:?}", kind, parsed.signals);
        return None;
    }
    Some((protocol, parsed.messages))
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockAdapter;
    use crate::units::Unit;

    fn connection(adapter: &MockAdapter) -> Connection {
        Connection::new(Box::new(adapter.clone()), ConnectOptions::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_adapter_is_unresponsive() {
        let adapter = MockAdapter::silent();
        let result = Connection::open(Box::new(adapter), ConnectOptions::default()).await;
        assert!(matches!(result, Err(ObdError::AdapterUnresponsive(_))));

        let conn = connection(&MockAdapter::silent());
        assert!(conn.connect().await.is_err());
        assert_eq!(conn.status(), ConnectionStatus::NotConnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_handshake_reaches_car_connected() {
        let adapter = MockAdapter::can_vehicle();
        let conn = connection(&adapter);
        conn.connect().await.unwrap();
        assert_eq!(conn.status(), ConnectionStatus::CarConnected);
        assert_eq!(conn.protocol(), Some(ObdProtocol::Iso15765_4Can11bit500));
        assert_eq!(conn.elm_version().as_deref(), Some("ELM327 v1.5"));
        assert_eq!(conn.ecus().engine(), Some(EcuAddress(0x7E8)));

        let writes = adapter.writes();
        assert_eq!(&writes[..6], &["ATZ", "ATE0", "ATH1", "ATL0", "ATSP0", "0100"]);

        let rpm = registry().by_name("RPM").unwrap();
        let responses = conn.query(rpm).await.unwrap();
        assert_eq!(responses.len(), 1);
        let quantity = responses[0].value.as_quantity().unwrap();
        assert_eq!(quantity.value, 1726.0);
        assert_eq!(quantity.unit, Unit::Rpm);
        assert_eq!(responses[0].role, EcuRole::Engine);
        assert!(responses[0].confirmed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_obd_connected_until_vehicle_answers() {
        let adapter = MockAdapter::new()
            .with_response("ATDPN", &["A6"])
            .with_response("0100", &["7E8 06 41 00 BE 3F B8 13"]);
        let conn = connection(&adapter);
        adapter.respond_then("0100", &["NO DATA"]);
        conn.connect().await.unwrap();
        assert_eq!(conn.status(), ConnectionStatus::ObdConnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_marks_supported_commands() {
        let conn = connection(&MockAdapter::can_vehicle());
        conn.connect().await.unwrap();
        let reg = registry();
        assert!(conn.supports(reg.by_name("RPM").unwrap()));
        assert!(conn.supports(reg.by_name("DTC_RPM").unwrap()));
        assert!(conn.supports(reg.by_name("VIN").unwrap()));
        assert!(conn.supports(reg.by_name("GET_DTC").unwrap()));
        // 0100 BE 3F B8 13 leaves PIDs 02, 09 and 0A unset
        assert!(!conn.supports(reg.by_name("FUEL_PRESSURE").unwrap()));
        assert!(!conn.supports(reg.by_name("DTC_FUEL_PRESSURE").unwrap()));
        assert!(conn.supported_commands().len() > 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_pid_is_no_data() {
        let adapter = MockAdapter::can_vehicle();
        let conn = connection(&adapter);
        conn.connect().await.unwrap();
        let status = conn.status();

        adapter.set_silent(true);
        let responses = conn.query_named("OIL_TEMP").await.unwrap();
        assert_eq!(responses.len(), 1);
        assert!(responses[0].is_no_data());
        assert!(!responses[0].confirmed);
        assert_eq!(conn.status(), status);

        adapter.set_silent(false);
        let responses = conn.query_named("0111").await.unwrap();
        assert!(responses[0].is_no_data());
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_before_connect_and_after_close() {
        let conn = connection(&MockAdapter::can_vehicle());
        let speed = registry().by_name("SPEED").unwrap();
        assert!(matches!(conn.query(speed).await, Err(ObdError::NotConnected)));

        conn.connect().await.unwrap();
        assert!(conn.query(speed).await.is_ok());
        conn.close().await.unwrap();
        assert_eq!(conn.status(), ConnectionStatus::NotConnected);
        assert!(matches!(conn.query(speed).await, Err(ObdError::NotConnected)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_protocol() {
        let adapter = MockAdapter::can_vehicle();
        let options = ConnectOptions {
            protocol: ObdProtocol::Iso15765_4Can11bit500,
            ..ConnectOptions::default()
        };
        let conn = Connection::open(Box::new(adapter.clone()), options).await.unwrap();
        assert_eq!(conn.protocol(), Some(ObdProtocol::Iso15765_4Can11bit500));
        assert!(adapter.writes().contains(&"ATSP6".to_string()));
        assert!(!adapter.writes().contains(&"ATDPN".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_protocol_unable_to_connect() {
        let adapter = MockAdapter::new().with_response("0100", &["UNABLE TO CONNECT"]);
        let options = ConnectOptions {
            protocol: ObdProtocol::J1850Pwm,
            ..ConnectOptions::default()
        };
        let conn = Connection::new(Box::new(adapter), options);
        assert!(matches!(conn.connect().await, Err(ObdError::ProtocolDetectionFailed(_))));
        assert_eq!(conn.status(), ConnectionStatus::ElmConnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_detection_falls_back_to_try_order() {
        let adapter = MockAdapter::new()
            .with_response("ATDPN", &["0"])
            .with_response("0100", &["SEARCHING...", "UNABLE TO CONNECT"]);
        let conn = connection(&adapter);
        // Answers once the legacy J1850 PWM protocol is tried
        for _ in 0..2 {
            adapter.respond_then("0100", &["UNABLE TO CONNECT"]);
        }
        adapter.respond_then("0100", &["48 6B 10 41 00 BE 3F B8 13 4F"]);
        conn.connect().await.unwrap();
        assert_eq!(conn.protocol(), Some(ObdProtocol::J1850Pwm));
        let tries: Vec<String> = adapter
            .writes()
            .into_iter()
            .filter(|w| w.starts_with("ATTP"))
            .collect();
        assert_eq!(tries, vec!["ATTP6", "ATTP8", "ATTP1"]);
        assert_eq!(conn.ecus().engine(), Some(EcuAddress(0x10)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_detection_failure_reverts_to_elm_connected() {
        let adapter = MockAdapter::new().with_response("0100", &["UNABLE TO CONNECT"]);
        let conn = connection(&adapter);
        assert!(matches!(conn.connect().await, Err(ObdError::ProtocolDetectionFailed(_))));
        assert_eq!(conn.status(), ConnectionStatus::ElmConnected);
        let tries = adapter.writes().iter().filter(|w| w.starts_with("ATTP")).count();
        assert_eq!(tries, ObdProtocol::AUTO_ORDER.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_ath1_reply() {
        let adapter = MockAdapter::new().with_response("ATH1", &["?"]);
        let conn = connection(&adapter);
        assert!(matches!(conn.connect().await, Err(ObdError::AdapterUnresponsive(_))));
        assert_eq!(conn.status(), ConnectionStatus::NotConnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_garbage_reply_is_protocol_error() {
        let adapter = MockAdapter::can_vehicle();
        let conn = connection(&adapter);
        conn.connect().await.unwrap();
        adapter.respond("010D", &["7E8 07 41 0D"]);
        let speed = registry().by_name("SPEED").unwrap();
        assert!(matches!(conn.query(speed).await, Err(ObdError::ProtocolError { .. })));
        // Sent once plus one retry
        assert_eq!(adapter.writes().iter().filter(|w| *w == "010D").count(), 2);
        assert!(conn.status().can_query());
    }

    #[tokio::test(start_paused = true)]
    async fn test_multiple_ecus_answer() {
        let adapter = MockAdapter::can_vehicle()
            .with_response("0100", &["7E8 06 41 00 BE 3F B8 13", "7E9 06 41 00 98 18 80 11"]);
        let conn = connection(&adapter);
        conn.connect().await.unwrap();
        adapter.respond("010D", &["7E8 03 41 0D 3C", "7E9 03 41 0D 3D"]);
        let responses = conn.query_named("SPEED").await.unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].role, EcuRole::Engine);
        assert_eq!(responses[1].role, EcuRole::Transmission);
        assert_eq!(responses[1].value.as_quantity().unwrap().value, 61.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_multi_frame_vin() {
        let conn = connection(&MockAdapter::can_vehicle());
        conn.connect().await.unwrap();
        let responses = conn.query_named("VIN").await.unwrap();
        assert_eq!(responses[0].value, DecodedValue::Text("1D4GP00R55B123456".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_reply_is_drained() {
        let adapter = MockAdapter::can_vehicle();
        let conn = connection(&adapter);
        conn.connect().await.unwrap();

        // The speed reply lands after the timeout and must not answer RPM
        adapter.set_delay(Duration::from_millis(2500));
        let responses = conn.query_named("SPEED").await.unwrap();
        assert!(responses[0].is_no_data());

        adapter.set_delay(Duration::ZERO);
        let responses = conn.query_named("RPM").await.unwrap();
        assert_eq!(responses[0].value.as_quantity().unwrap().value, 1726.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_query_does_not_leak() {
        let adapter = MockAdapter::can_vehicle();
        let conn = connection(&adapter);
        conn.connect().await.unwrap();

        adapter.set_delay(Duration::from_millis(500));
        let cancelled =
            tokio::time::timeout(Duration::from_millis(100), conn.query_named("SPEED")).await;
        assert!(cancelled.is_err());

        adapter.set_delay(Duration::ZERO);
        let responses = conn.query_named("RPM").await.unwrap();
        assert_eq!(responses[0].value.as_quantity().unwrap().value, 1726.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_errors_session() {
        let adapter = MockAdapter::can_vehicle();
        let conn = connection(&adapter);
        conn.connect().await.unwrap();
        adapter.set_broken(true);
        assert!(matches!(conn.query_named("RPM").await, Err(ObdError::Transport(_))));
        assert_eq!(conn.status(), ConnectionStatus::Errored);
        assert!(matches!(conn.query_named("RPM").await, Err(ObdError::NotConnected)));
        conn.close().await.unwrap();
        assert_eq!(conn.status(), ConnectionStatus::NotConnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_voltage_check() {
        let adapter = MockAdapter::can_vehicle().with_response("ATRV", &["4.2V"]);
        let options = ConnectOptions {
            check_voltage: true,
            ..ConnectOptions::default()
        };
        let conn = Connection::new(Box::new(adapter.clone()), options);
        assert!(matches!(conn.connect().await, Err(ObdError::VoltageOutOfRange(_))));

        adapter.respond("ATRV", &["12.6V"]);
        conn.connect().await.unwrap();
        assert_eq!(conn.adapter_voltage().await.unwrap(), 12.6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_power_wakes_on_query() {
        let adapter = MockAdapter::can_vehicle();
        let conn = connection(&adapter);
        conn.connect().await.unwrap();
        conn.low_power().await.unwrap();
        let responses = conn.query_named("SPEED").await.unwrap();
        assert_eq!(responses[0].value.as_quantity().unwrap().value, 60.0);
        let writes = adapter.writes();
        let lp = writes.iter().position(|w| w == "ATLP").unwrap();
        assert_eq!(writes[lp + 1], " ");
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_reply_from_other_ecu_is_not_reused() {
        let adapter = MockAdapter::can_vehicle();
        let conn = connection(&adapter);
        conn.connect().await.unwrap();

        // Lands after two query timeouts
        adapter.respond("010D", &["7E9 03 41 0D 3C"]);
        adapter.set_delay(Duration::from_millis(4500));
        let responses = conn.query_named("SPEED").await.unwrap();
        assert!(responses[0].is_no_data());

        adapter.respond("010D", &["7E8 03 41 0D 3D"]);
        adapter.set_delay(Duration::ZERO);
        let responses = conn.query_named("SPEED").await.unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].ecu, Some(EcuAddress(0x7E8)));
        assert_eq!(responses[0].value.as_quantity().unwrap().value, 61.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_sent_while_previous_reply_outstanding() {
        let adapter = MockAdapter::can_vehicle();
        let conn = connection(&adapter);
        conn.connect().await.unwrap();

        adapter.set_delay(Duration::from_secs(20));
        assert!(conn.query_named("SPEED").await.unwrap()[0].is_no_data());
        let written = adapter.writes().len();
        assert!(matches!(
            conn.query_named("RPM").await,
            Err(ObdError::AdapterUnresponsive(_))
        ));
        assert_eq!(adapter.writes().len(), written);
        assert!(conn.status().can_query());

        tokio::time::sleep(Duration::from_secs(15)).await;
        adapter.set_delay(Duration::ZERO);
        let responses = conn.query_named("RPM").await.unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].value.as_quantity().unwrap().value, 1726.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_header_sent_only_when_it_changes() {
        let adapter = MockAdapter::can_vehicle();
        let conn = connection(&adapter);
        conn.connect().await.unwrap();
        adapter.respond("010C", &["7E9 04 41 0C 1A F8"]);

        let rpm = registry().by_name("RPM").unwrap().clone().with_header("7E1");
        for _ in 0..2 {
            let responses = conn.query(&rpm).await.unwrap();
            assert_eq!(responses[0].ecu, Some(EcuAddress(0x7E9)));
        }
        conn.query_named("SPEED").await.unwrap();
        conn.query(&rpm).await.unwrap();
        conn.close().await.unwrap();

        let headers: Vec<String> = adapter
            .writes()
            .into_iter()
            .filter(|w| w.starts_with("ATSH"))
            .collect();
        assert_eq!(headers, vec!["ATSH 7E1", "ATSH 7E0", "ATSH 7E1", "ATSH 7E0"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_header_is_retried() {
        let adapter = MockAdapter::can_vehicle().with_response("ATSH 7E1", &["?"]);
        let conn = connection(&adapter);
        conn.connect().await.unwrap();

        let rpm = registry().by_name("RPM").unwrap().clone().with_header("7E1");
        conn.query(&rpm).await.unwrap();
        conn.query(&rpm).await.unwrap();
        conn.close().await.unwrap();
        let headers = adapter.writes().iter().filter(|w| w.starts_with("ATSH")).count();
        assert_eq!(headers, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_mode_appends_frame_count_then_repeats() {
        let adapter = MockAdapter::can_vehicle().with_response("010D1", &["7E8 03 41 0D 3C"]);
        let options = ConnectOptions {
            fast: true,
            ..ConnectOptions::default()
        };
        let conn = Connection::open(Box::new(adapter.clone()), options).await.unwrap();
        for _ in 0..3 {
            let responses = conn.query_named("SPEED").await.unwrap();
            assert_eq!(responses[0].value.as_quantity().unwrap().value, 60.0);
        }
        let writes = adapter.writes();
        let first = writes.iter().position(|w| w == "010D").unwrap();
        assert_eq!(&writes[first..], &["010D", "010D1", ""]);

        // Another request in between is sent in full
        conn.query_named("RPM").await.unwrap();
        conn.query_named("SPEED").await.unwrap();
        assert_eq!(adapter.writes().last().map(String::as_str), Some("010D1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_line_repeat_needs_fast_mode() {
        let adapter = MockAdapter::can_vehicle();
        let conn = connection(&adapter);
        conn.connect().await.unwrap();
        conn.query_named("SPEED").await.unwrap();
        conn.query_named("SPEED").await.unwrap();
        assert!(!adapter.writes().iter().any(String::is_empty));
    }

    #[tokio::test(start_paused = true)]
    async fn test_imperial_units() {
        let options = ConnectOptions {
            units: UnitsPreference::Imperial,
            ..ConnectOptions::default()
        };
        let conn = Connection::open(Box::new(MockAdapter::can_vehicle()), options)
            .await
            .unwrap();
        let speed = conn.query_named("SPEED").await.unwrap()[0].value.as_quantity().unwrap();
        assert_eq!(speed.unit, Unit::Mph);
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: ConnectOptions =
            serde_json::from_str(r#"{"protocol": "6", "fast": true}"#).unwrap();
        assert_eq!(options.protocol, ObdProtocol::Iso15765_4Can11bit500);
        assert!(options.fast);
        assert_eq!(options.timeout_ms, 2000);
        assert_eq!(options.units, UnitsPreference::Metric);
    }
}
