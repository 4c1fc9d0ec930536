//! Rendering of decoded responses and session details

use obd_protocol::{Command, Connection, DecodedResponse, DecodedValue, EcuRole, ObdProtocol, ResponseLength};
use serde::Serialize;

/// One response as printed by the tool
#[derive(Debug, Serialize)]
pub struct ResponseRow<'a> {
    pub command: &'a str,
    pub ecu: Option<String>,
    pub role: EcuRole,
    pub value: &'a DecodedValue,
    pub confirmed: bool,
    pub timestamp_ms: u64,
}

impl<'a> From<&'a DecodedResponse> for ResponseRow<'a> {
    fn from(response: &'a DecodedResponse) -> Self {
        Self {
            command: &response.command.name,
            ecu: response.ecu.map(|ecu| ecu.to_string()),
            role: response.role,
            value: &response.value,
            confirmed: response.confirmed,
            timestamp_ms: response.timestamp_ms,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EcuRow {
    pub address: String,
    pub role: EcuRole,
}

/// Adapter and vehicle summary for the `info` command
#[derive(Debug, Serialize)]
pub struct SessionReport {
    pub status: String,
    pub elm_version: Option<String>,
    pub protocol: Option<String>,
    pub voltage: Option<f64>,
    pub ecus: Vec<EcuRow>,
    pub supported_commands: usize,
}

impl SessionReport {
    pub fn collect(connection: &Connection, voltage: Option<f64>) -> Self {
        Self {
            status: connection.status().to_string(),
            elm_version: connection.elm_version(),
            protocol: connection.protocol().map(describe_protocol),
            voltage,
            ecus: connection
                .ecus()
                .iter()
                .map(|(address, role)| EcuRow {
                    address: address.to_string(),
                    role,
                })
                .collect(),
            supported_commands: connection.supported_commands().len(),
        }
    }
}

fn describe_protocol(protocol: ObdProtocol) -> String {
    format!("{} ({})", protocol.name(), protocol.elm_id())
}

pub fn render_response(response: &DecodedResponse, json: bool) -> String {
    let row = ResponseRow::from(response);
    if json {
        return to_json(&row);
    }
    match &row.ecu {
        Some(ecu) => format!("{} [{} {}]: {}", row.command, ecu, row.role, row.value),
        None => format!("{}: {}", row.command, row.value),
    }
}

pub fn render_report(report: &SessionReport, json: bool) -> String {
    if json {
        return to_json(report);
    }
    let mut lines = vec![
        format!("Status:     {}", report.status),
        format!("Adapter:    {}", report.elm_version.as_deref().unwrap_or("unknown")),
        format!("Protocol:   {}", report.protocol.as_deref().unwrap_or("none")),
    ];
    if let Some(volts) = report.voltage {
        lines.push(format!("Voltage:    {volts:.1} V"));
    }
    for ecu in &report.ecus {
        lines.push(format!("ECU:        {} ({})", ecu.address, ecu.role));
    }
    lines.push(format!("Supported:  {} command(s)", report.supported_commands));
    lines.join("\n")
}

/// Registry entry line: request, name, response size and description
pub fn render_command(command: &Command) -> String {
    let bytes = match command.response {
        ResponseLength::Fixed(n) => n.to_string(),
        ResponseLength::Variable => "*".to_string(),
    };
    format!(
        "{:<8} {:<28} {:>3}  {}",
        command.request(),
        command.name,
        bytes,
        command.description
    )
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_protocol::{registry, ConnectOptions, MockAdapter};

    async fn connected() -> Connection {
        Connection::open(Box::new(MockAdapter::can_vehicle()), ConnectOptions::default())
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_rpm() {
        let conn = connected().await;
        let responses = conn.query_named("RPM").await.unwrap();
        assert_eq!(responses.len(), 1);

        let text = render_response(&responses[0], false);
        assert!(text.starts_with("RPM [7E8 engine]: "), "{text}");
        assert!(text.contains("1726"), "{text}");

        let json: serde_json::Value =
            serde_json::from_str(&render_response(&responses[0], true)).unwrap();
        assert_eq!(json["command"], "RPM");
        assert_eq!(json["ecu"], "7E8");
        assert_eq!(json["value"]["kind"], "numeric");
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_temperature() {
        let conn = connected().await;
        let responses = conn.query_named("COOLANT_TEMP").await.unwrap();
        let text = render_response(&responses[0], false);
        assert!(text.starts_with("COOLANT_TEMP"), "{text}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_report() {
        let conn = connected().await;
        let report = SessionReport::collect(&conn, Some(12.6));
        assert_eq!(report.ecus.len(), 1);
        assert_eq!(report.ecus[0].address, "7E8");
        assert!(report.supported_commands > 0);

        let text = render_report(&report, false);
        assert!(text.contains("ELM327 v1.5"));
        assert!(text.contains("Voltage:    12.6 V"));

        let json: serde_json::Value = serde_json::from_str(&render_report(&report, true)).unwrap();
        assert_eq!(json["ecus"][0]["role"], "engine");
    }

    #[test]
    fn test_render_command() {
        let line = render_command(registry().by_name("RPM").unwrap());
        assert!(line.starts_with("010C"));
        assert!(line.contains("RPM"));
    }
}
