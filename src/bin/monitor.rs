use clap::{App, Arg};
use radar_health::protocol::{self, Response, ResponseStatus, ServerMessage};
use radar_health::{HealthMonitor, MonitorConfig};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tokio::time;
use tracing::{debug, error, info, warn};

const DEFAULT_PORT: &str = "8090";
const EVENT_BROADCAST_BUFFER_SIZE: usize = 1024;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = App::new("radar-monitor")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Radar health monitoring service")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON configuration file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("TCP port for the line protocol")
                .takes_value(true)
                .default_value(DEFAULT_PORT),
        )
        .get_matches();

    let config = match matches.value_of("config") {
        Some(path) => MonitorConfig::from_file(path)?,
        None => MonitorConfig::default(),
    };
    let port = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse::<u16>()?;
    let tick = Duration::from_millis(config.pipeline_tick_ms);

    let monitor = Arc::new(Mutex::new(HealthMonitor::with_default_units(config, now_ms())?));
    monitor.lock().await.start(now_ms());

    let (event_tx, _) = broadcast::channel(EVENT_BROADCAST_BUFFER_SIZE);

    let server_monitor = Arc::clone(&monitor);
    let server_tx = event_tx.clone();
    let tcp_server = tokio::spawn(async move {
        if let Err(e) = start_tcp_server(port, server_monitor, server_tx).await {
            error!("TCP server error: {}", e);
        }
    });

    let mut interval = time::interval(tick);
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let events = {
                    let mut guard = monitor.lock().await;
                    guard.tick(now_ms());
                    guard.drain_events()
                };
                for event in events {
                    match protocol::encode(&ServerMessage::Event(event)) {
                        // No subscribers is fine.
                        Ok(line) => { let _ = event_tx.send(line); }
                        Err(e) => warn!("Failed to encode event: {}", e),
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    monitor.lock().await.stop();
    tcp_server.abort();
    info!("Radar health monitor stopped");
    Ok(())
}

async fn start_tcp_server(
    port: u16,
    monitor: Arc<Mutex<HealthMonitor>>,
    event_tx: broadcast::Sender<String>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    info!("Listening on 127.0.0.1:{}", port);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("Client connected: {}", addr);
                let client_monitor = Arc::clone(&monitor);
                let event_rx = event_tx.subscribe();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, client_monitor, event_rx).await {
                        warn!("Client {} error: {}", addr, e);
                    }
                    info!("Client {} disconnected", addr);
                });
            }
            Err(e) => error!("Failed to accept connection: {}", e),
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    monitor: Arc<Mutex<HealthMonitor>>,
    mut event_rx: broadcast::Receiver<String>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let writer = Arc::new(Mutex::new(writer));

    let event_writer = Arc::clone(&writer);
    let event_task = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(line) => {
                    let mut guard = event_writer.lock().await;
                    if guard.write_all(line.as_bytes()).await.is_err() || guard.write_all(b"\n").await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Client lagging, {} events skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        let now = now_ms();
        let response = match protocol::parse_request(&line) {
            Ok(request) => {
                debug!("Request: {:?}", request.command);
                let mut guard = monitor.lock().await;
                protocol::handle_request(&mut guard, request, now)
            }
            Err(e) => Response::failure(0, now, ResponseStatus::InvalidRequest, &e.to_string()),
        };

        let encoded = protocol::encode(&ServerMessage::Response(response))?;
        let mut guard = writer.lock().await;
        guard.write_all(encoded.as_bytes()).await?;
        guard.write_all(b"\n").await?;
    }

    event_task.abort();
    Ok(())
}
