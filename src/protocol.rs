//! JSON line protocol between `radar-monitor` and its clients.
//!
//! Each request is one JSON object per line. The server answers with a
//! `response` message carrying the request id, and pushes `event` messages
//! as the monitor produces them.

use crate::error::MonitorError;
use crate::events::MonitorEvent;
use crate::fault::FaultSeverity;
use crate::fault_injection::FaultInjection;
use crate::monitor::HealthMonitor;
use crate::pipeline::RawTelemetry;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

pub const MAX_REQUEST_SIZE: usize = 64 * 1024;
const DEFAULT_HISTORY_LIMIT: usize = 100;
const DEFAULT_TOP_FAULTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u32,
    #[serde(flatten)]
    pub command: RequestType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestType {
    Ping,
    /// System summary plus every unit's snapshot.
    Status,
    Unit {
        unit_id: String,
    },
    Faults {
        #[serde(default)]
        unit_id: Option<String>,
        #[serde(default)]
        history: bool,
        #[serde(default)]
        limit: Option<usize>,
    },
    Inject {
        unit_id: String,
        code: String,
        #[serde(default)]
        severity: Option<FaultSeverity>,
        #[serde(default)]
        duration_ms: Option<u64>,
        #[serde(default)]
        delay_ms: Option<u64>,
        #[serde(default)]
        auto_recover: Option<bool>,
    },
    Clear {
        unit_id: String,
        code: String,
    },
    ClearAll {
        #[serde(default)]
        unit_id: Option<String>,
    },
    Submit {
        unit_id: String,
        telemetry: RawTelemetry,
    },
    SubmitBatch {
        batch: RawTelemetry,
    },
    Trend {
        unit_id: String,
        parameter: String,
    },
    Availability {
        #[serde(default)]
        unit_id: Option<String>,
    },
    Scenario {
        name: String,
    },
    Scenarios,
    Analytics {
        #[serde(default)]
        unit_id: Option<String>,
    },
    SetEnabled {
        unit_id: String,
        enabled: bool,
    },
    Reset {
        unit_id: String,
    },
    Stats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseStatus {
    Success,
    NotFound,
    InvalidRequest,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u32,
    pub timestamp: u64,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Response {
    pub fn success(id: u32, timestamp: u64, data: Value) -> Self {
        Self {
            id,
            timestamp,
            status: ResponseStatus::Success,
            message: None,
            data: Some(data),
        }
    }

    pub fn failure(id: u32, timestamp: u64, status: ResponseStatus, message: &str) -> Self {
        Self {
            id,
            timestamp,
            status,
            message: Some(message.to_string()),
            data: None,
        }
    }

    fn from_error(id: u32, timestamp: u64, error: &MonitorError) -> Self {
        let status = match error {
            MonitorError::UnknownUnit(_) | MonitorError::UnknownScenario(_) => ResponseStatus::NotFound,
            MonitorError::InvalidConfig(_) => ResponseStatus::InvalidRequest,
            _ => ResponseStatus::Error,
        };
        Self::failure(id, timestamp, status, &error.to_string())
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

/// Everything the server writes to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum ServerMessage {
    Response(Response),
    Event(MonitorEvent),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("message exceeds {MAX_REQUEST_SIZE} bytes")]
    MessageTooLarge,
}

pub fn parse_request(line: &str) -> Result<Request, ProtocolError> {
    if line.len() > MAX_REQUEST_SIZE {
        return Err(ProtocolError::MessageTooLarge);
    }
    Ok(serde_json::from_str(line.trim())?)
}

pub fn encode(message: &ServerMessage) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Executes one request against the monitor.
pub fn handle_request(monitor: &mut HealthMonitor, request: Request, now: u64) -> Response {
    let id = request.id;
    let not_found = |what: &str| Response::failure(id, now, ResponseStatus::NotFound, what);

    match request.command {
        RequestType::Ping => Response::success(id, now, json!("pong")),
        RequestType::Status => Response::success(
            id,
            now,
            json!({
                "system": monitor.system_health_summary(now),
                "units": monitor.health_snapshots(),
            }),
        ),
        RequestType::Unit { unit_id } => match monitor.health_snapshot(&unit_id) {
            Some(snapshot) => Response::success(id, now, to_value(snapshot)),
            None => not_found(&format!("unknown unit `{unit_id}`")),
        },
        RequestType::Faults { unit_id, history, limit } => {
            let faults = if history {
                monitor.fault_history(unit_id.as_deref(), limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
            } else {
                monitor.active_faults(unit_id.as_deref())
            };
            Response::success(id, now, to_value(&faults))
        }
        RequestType::Inject {
            unit_id,
            code,
            severity,
            duration_ms,
            delay_ms,
            auto_recover,
        } => {
            let mut injection = FaultInjection::new(&unit_id, &code)
                .severity(severity.unwrap_or(FaultSeverity::Warning))
                .delayed(delay_ms.unwrap_or(0));
            injection.duration_ms = duration_ms.unwrap_or(0);
            injection.auto_recover = auto_recover.unwrap_or(false);
            match monitor.inject_fault(injection, now) {
                Ok(applied) => Response::success(id, now, json!({ "applied": applied })),
                Err(e) => Response::from_error(id, now, &e),
            }
        }
        RequestType::Clear { unit_id, code } => {
            if monitor.clear_fault(&unit_id, &code, now) {
                Response::success(id, now, json!({ "cleared": true }))
            } else {
                not_found(&format!("no active fault `{code}` on `{unit_id}`"))
            }
        }
        RequestType::ClearAll { unit_id } => {
            let cleared = monitor.clear_all_faults(unit_id.as_deref(), now);
            Response::success(id, now, json!({ "cleared": cleared }))
        }
        RequestType::Submit { unit_id, telemetry } => match monitor.submit_telemetry(&unit_id, telemetry, now) {
            Ok(()) => Response::success(id, now, json!({ "queued": 1 })),
            Err(e) => Response::from_error(id, now, &e),
        },
        RequestType::SubmitBatch { batch } => {
            let queued = monitor.submit_batch(batch, now);
            Response::success(id, now, json!({ "queued": queued }))
        }
        RequestType::Trend { unit_id, parameter } => match monitor.trend_result(&unit_id, &parameter) {
            Some(trend) => Response::success(id, now, to_value(&trend)),
            None => not_found(&format!("no trend for `{unit_id}.{parameter}`")),
        },
        RequestType::Availability { unit_id } => Response::success(
            id,
            now,
            json!({ "availability": monitor.availability(unit_id.as_deref()) }),
        ),
        RequestType::Scenario { name } => match monitor.run_scenario(&name, now) {
            Ok(()) => Response::success(id, now, json!({ "started": name })),
            Err(e) => Response::from_error(id, now, &e),
        },
        RequestType::Scenarios => Response::success(id, now, to_value(&monitor.available_scenarios())),
        RequestType::Analytics { unit_id: Some(unit_id) } => match monitor.unit_analytics(&unit_id) {
            Some(analytics) => Response::success(id, now, to_value(&analytics)),
            None => not_found(&format!("unknown unit `{unit_id}`")),
        },
        RequestType::Analytics { unit_id: None } => Response::success(
            id,
            now,
            json!({
                "summary": monitor.system_health_summary(now),
                "faults": monitor.fault_summary(),
                "top_faults": monitor.top_faults(DEFAULT_TOP_FAULTS),
                "ranking": monitor.unit_ranking(),
            }),
        ),
        RequestType::SetEnabled { unit_id, enabled } => match monitor.set_unit_enabled(&unit_id, enabled, now) {
            Ok(()) => Response::success(id, now, json!({ "enabled": enabled })),
            Err(e) => Response::from_error(id, now, &e),
        },
        RequestType::Reset { unit_id } => match monitor.reset_unit(&unit_id, now) {
            Ok(()) => Response::success(id, now, json!({ "reset": unit_id })),
            Err(e) => Response::from_error(id, now, &e),
        },
        RequestType::Stats => Response::success(id, now, to_value(&monitor.get_stats())),
    }
}
