use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use colored::*;
use radar_health::protocol::{Request, RequestType, Response, ServerMessage};
use radar_health::FaultSeverity;
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8090";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_ID: u32 = 1;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> CliResult<()> {
    let matches = App::new("radarctl")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Command-line client for the radar health monitor")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("host")
                .short("H")
                .long("host")
                .value_name("HOST")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .arg(
            Arg::with_name("json")
                .long("json")
                .help("Print raw JSON responses")
                .global(true),
        )
        .subcommand(SubCommand::with_name("ping").about("Check the monitor is responsive"))
        .subcommand(SubCommand::with_name("status").about("System summary and every unit's state"))
        .subcommand(
            SubCommand::with_name("unit")
                .about("Full health snapshot of one unit")
                .arg(Arg::with_name("unit").required(true)),
        )
        .subcommand(
            SubCommand::with_name("faults")
                .about("Active faults, or cleared ones with --history")
                .arg(Arg::with_name("unit"))
                .arg(Arg::with_name("history").long("history"))
                .arg(Arg::with_name("limit").long("limit").takes_value(true)),
        )
        .subcommand(
            SubCommand::with_name("inject")
                .about("Inject a fault")
                .arg(Arg::with_name("unit").required(true))
                .arg(Arg::with_name("code").required(true))
                .arg(
                    Arg::with_name("severity")
                        .long("severity")
                        .takes_value(true)
                        .possible_values(&["info", "warning", "critical", "fatal"])
                        .default_value("warning"),
                )
                .arg(Arg::with_name("duration").long("duration").takes_value(true).help("Auto-recover after MS"))
                .arg(Arg::with_name("delay").long("delay").takes_value(true).help("Inject after MS")),
        )
        .subcommand(
            SubCommand::with_name("clear")
                .about("Clear one fault, or every fault of a unit without a code")
                .arg(Arg::with_name("unit").required(true))
                .arg(Arg::with_name("code")),
        )
        .subcommand(
            SubCommand::with_name("submit")
                .about("Submit telemetry, e.g. '{\"inputVoltage\": 170}'")
                .arg(Arg::with_name("unit").required(true))
                .arg(Arg::with_name("telemetry").required(true)),
        )
        .subcommand(
            SubCommand::with_name("trend")
                .about("Trend of one parameter")
                .arg(Arg::with_name("unit").required(true))
                .arg(Arg::with_name("parameter").required(true)),
        )
        .subcommand(
            SubCommand::with_name("scenario")
                .about("Run a fault scenario, or list them without a name")
                .arg(Arg::with_name("name")),
        )
        .subcommand(
            SubCommand::with_name("analytics")
                .about("System analytics, or one unit's")
                .arg(Arg::with_name("unit")),
        )
        .subcommand(SubCommand::with_name("events").about("Stream events until interrupted"))
        .get_matches();

    let host = matches.value_of("host").unwrap_or(DEFAULT_HOST).to_string();
    let port = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse::<u16>()?;
    let raw = matches.is_present("json");

    let (name, sub) = matches.subcommand();
    let sub = sub.cloned().unwrap_or_default();
    if name == "events" {
        return stream_events(&host, port).await;
    }

    let command = build_request(name, &sub)?;
    let response = send_request(&host, port, command).await?;
    if raw {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_response(name, &response);
    }
    Ok(())
}

fn build_request(name: &str, sub: &ArgMatches<'_>) -> CliResult<RequestType> {
    let arg = |key: &str| sub.value_of(key).map(str::to_string);
    let required = |key: &str| arg(key).ok_or_else(|| format!("missing <{key}>"));
    let number = |key: &str| -> CliResult<Option<u64>> { Ok(sub.value_of(key).map(str::parse::<u64>).transpose()?) };

    let command = match name {
        "ping" => RequestType::Ping,
        "status" => RequestType::Status,
        "unit" => RequestType::Unit {
            unit_id: required("unit")?,
        },
        "faults" => RequestType::Faults {
            unit_id: arg("unit"),
            history: sub.is_present("history"),
            limit: number("limit")?.map(|l| l as usize),
        },
        "inject" => {
            let duration = number("duration")?;
            RequestType::Inject {
                unit_id: required("unit")?,
                code: required("code")?,
                severity: Some(parse_severity(sub.value_of("severity").unwrap_or("warning"))),
                duration_ms: duration,
                delay_ms: number("delay")?,
                auto_recover: Some(duration.is_some()),
            }
        }
        "clear" => match arg("code") {
            Some(code) => RequestType::Clear {
                unit_id: required("unit")?,
                code,
            },
            None => RequestType::ClearAll { unit_id: arg("unit") },
        },
        "submit" => {
            let telemetry = match serde_json::from_str::<Value>(&required("telemetry")?)? {
                Value::Object(map) => map,
                _ => return Err("telemetry must be a JSON object".into()),
            };
            RequestType::Submit {
                unit_id: required("unit")?,
                telemetry,
            }
        }
        "trend" => RequestType::Trend {
            unit_id: required("unit")?,
            parameter: required("parameter")?,
        },
        "scenario" => match arg("name") {
            Some(name) => RequestType::Scenario { name },
            None => RequestType::Scenarios,
        },
        "analytics" => RequestType::Analytics { unit_id: arg("unit") },
        other => return Err(format!("unknown command `{other}`").into()),
    };
    Ok(command)
}

fn parse_severity(value: &str) -> FaultSeverity {
    match value {
        "info" => FaultSeverity::Info,
        "critical" => FaultSeverity::Critical,
        "fatal" => FaultSeverity::Fatal,
        _ => FaultSeverity::Warning,
    }
}

async fn connect(host: &str, port: u16) -> CliResult<TcpStream> {
    match TcpStream::connect((host, port)).await {
        Ok(stream) => Ok(stream),
        Err(e) => {
            eprintln!("{} Failed to connect to {}:{}", "✗".red(), host, port);
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                eprintln!("  Start the service with {}", "radar-monitor".bright_cyan());
            }
            Err(e.into())
        }
    }
}

async fn send_request(host: &str, port: u16, command: RequestType) -> CliResult<Response> {
    let stream = connect(host, port).await?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let request = Request {
        id: REQUEST_ID,
        command,
    };
    writer.write_all(serde_json::to_string(&request)?.as_bytes()).await?;
    writer.write_all(b"\n").await?;

    match tokio::time::timeout(REQUEST_TIMEOUT, read_response(&mut reader)).await {
        Ok(result) => result,
        Err(_) => Err(format!("no response within {}s", REQUEST_TIMEOUT.as_secs()).into()),
    }
}

async fn read_response(reader: &mut BufReader<OwnedReadHalf>) -> CliResult<Response> {
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Err("server closed connection".into());
        }
        // Events may arrive before our response.
        if let Ok(ServerMessage::Response(response)) = serde_json::from_str(&line) {
            return Ok(response);
        }
    }
}

async fn stream_events(host: &str, port: u16) -> CliResult<()> {
    let stream = connect(host, port).await?;
    let mut lines = BufReader::new(stream).lines();
    println!("{}", "Streaming events (Ctrl+C to stop)".dimmed());
    while let Some(line) = lines.next_line().await? {
        if let Ok(ServerMessage::Event(event)) = serde_json::from_str(&line) {
            let value = serde_json::to_value(&event)?;
            let kind = value["event"].as_str().unwrap_or("event").to_string();
            let unit = value["unit_id"].as_str().unwrap_or("-").to_string();
            let label = match kind.as_str() {
                "critical_fault" | "outage_started" => kind.bright_red(),
                "fault_registered" | "anomaly_detected" | "validation_failed" => kind.yellow(),
                "fault_cleared" | "outage_ended" => kind.green(),
                _ => kind.normal(),
            };
            println!("{:<22} {:<10} {}", label, unit, value);
        }
    }
    Ok(())
}

fn colored_state(state: &str) -> ColoredString {
    match state {
        "OK" => state.bright_green(),
        "Degraded" => state.yellow(),
        "Fail" => state.bright_red(),
        _ => state.dimmed(),
    }
}

fn print_response(name: &str, response: &Response) {
    if !response.is_success() {
        println!(
            "{} {:?}: {}",
            "✗".red(),
            response.status,
            response.message.as_deref().unwrap_or("request failed")
        );
        return;
    }
    let data = response.data.clone().unwrap_or(Value::Null);

    match name {
        "ping" => println!("{} monitor is responsive", "✓".green()),
        "status" => {
            let system = &data["system"];
            println!(
                "{} {}  score {:.1}  availability {:.2}%  faults {} ({} critical)",
                "System".bold(),
                colored_state(system["state"].as_str().unwrap_or("Unknown")),
                system["average_score"].as_f64().unwrap_or(0.0),
                system["availability"].as_f64().unwrap_or(100.0),
                system["active_faults"],
                system["critical_faults"],
            );
            for unit in data["units"].as_array().into_iter().flatten() {
                println!(
                    "  {:<9} {:<9} {:>6.1}  {}",
                    unit["unit_id"].as_str().unwrap_or("?"),
                    colored_state(unit["state"].as_str().unwrap_or("Unknown")),
                    unit["score"].as_f64().unwrap_or(0.0),
                    unit["status_message"].as_str().unwrap_or(""),
                );
            }
        }
        "faults" => {
            let faults = data.as_array().cloned().unwrap_or_default();
            if faults.is_empty() {
                println!("{}", "No faults".green());
            }
            for fault in faults {
                let severity = fault["severity"].as_str().unwrap_or("?");
                let severity = match severity {
                    "Critical" | "Fatal" => severity.bright_red(),
                    "Warning" => severity.yellow(),
                    _ => severity.normal(),
                };
                println!(
                    "  {:<9} {:<20} {:<9} {}",
                    fault["unit_id"].as_str().unwrap_or("?"),
                    fault["code"].as_str().unwrap_or("?"),
                    severity,
                    fault["description"].as_str().unwrap_or(""),
                );
            }
        }
        "trend" => println!(
            "{} slope {:.4}/s  R² {:.3}  current {:.2}  predicted {:.2}  anomaly {:.2}",
            data["direction"].as_str().unwrap_or("?").bold(),
            data["slope"].as_f64().unwrap_or(0.0),
            data["r_squared"].as_f64().unwrap_or(0.0),
            data["current_value"].as_f64().unwrap_or(0.0),
            data["predicted_value"].as_f64().unwrap_or(0.0),
            data["anomaly_score"].as_f64().unwrap_or(0.0),
        ),
        _ => match serde_json::to_string_pretty(&data) {
            Ok(pretty) => println!("{pretty}"),
            Err(_) => println!("{data}"),
        },
    }
}
