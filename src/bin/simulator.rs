use clap::{App, Arg};
use shutterbus::config::ControllerConfig;
use shutterbus::ports::{MemoryOutputs, PublishResult, PublishedMessage, SystemClock, Transport};
use shutterbus::protocol::ProtocolHandler;
use shutterbus::ShutterController;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tokio::time;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const PUBLISH_BROADCAST_BUFFER_SIZE: usize = 256;

/// Fans published status messages out to every connected client as JSON
/// lines. Ready while at least one client is listening.
struct BroadcastTransport {
    client_id: String,
    tx: broadcast::Sender<String>,
}

impl Transport for BroadcastTransport {
    fn is_ready(&self) -> bool {
        self.tx.receiver_count() > 0
    }

    fn publish(&mut self, topic: &str, payload: &str, retain: bool) -> PublishResult {
        let message = PublishedMessage {
            topic: topic.into(),
            payload: payload.into(),
            retain,
        };

        let line = match serde_json::to_string(&message) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to encode publish for {}: {}", topic, e);
                return PublishResult::Failed;
            }
        };

        match self.tx.send(line) {
            Ok(_) => PublishResult::Ok,
            Err(_) => PublishResult::Failed,
        }
    }

    fn client_id(&self) -> &str {
        &self.client_id
    }
}

type Controller = ShutterController<MemoryOutputs, SystemClock, BroadcastTransport>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("shutterbus-simulator")
        .version("0.1.0")
        .author("Home Automation Engineering Team")
        .about("Simulated shutter relay board with a TCP command and status interface")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("listen")
                .short("l")
                .long("listen")
                .value_name("ADDR")
                .help("Listen address, overrides the configuration")
                .takes_value(true),
        )
        .get_matches();

    let mut config = match matches.value_of("config") {
        Some(path) => ControllerConfig::load(Path::new(path))?,
        None => ControllerConfig::default(),
    };
    if let Some(listen) = matches.value_of("listen") {
        config.listen = listen.to_string();
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    println!("🪟  Shutter Relay Board Simulator");
    println!("================================");

    let (publish_tx, _) = broadcast::channel(PUBLISH_BROADCAST_BUFFER_SIZE);
    let transport = BroadcastTransport {
        client_id: config.client_id.clone(),
        tx: publish_tx.clone(),
    };

    let mut controller = ShutterController::new(
        MemoryOutputs::with_channels(usize::from(config.channel_limit)),
        SystemClock::new(),
        transport,
    )
        .with_channel_limit(config.channel_limit)
        .with_discovery_prefix(&config.discovery_prefix);
    config.apply(&mut controller)?;
    info!("Configured {} shutter(s) for client '{}'", controller.active_count(), config.client_id);

    let controller = Arc::new(Mutex::new(controller));

    let listener = TcpListener::bind(&config.listen).await?;
    info!("🌐 TCP server listening on {}", config.listen);

    let tcp_controller = Arc::clone(&controller);
    let tcp_publish_tx = publish_tx.clone();
    let tcp_server = tokio::spawn(async move {
        if let Err(e) = serve(listener, tcp_controller, tcp_publish_tx).await {
            error!("TCP server error: {}", e);
        }
    });

    let mut interval = time::interval(Duration::from_millis(config.tick_interval_ms));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let mut guard = controller.lock().await;
                guard.tick();
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    {
        // Leave every relay de-energized on the way out.
        let mut guard = controller.lock().await;
        let active: Vec<usize> = guard.active_indices().collect();
        for index in active {
            if let Err(e) = guard.stop(index) {
                warn!("Failed to stop shutter {}: {}", index, e);
            }
        }
    }

    tcp_server.abort();
    println!("Shutter simulator stopped");

    Ok(())
}

async fn serve(
    listener: TcpListener,
    controller: Arc<Mutex<Controller>>,
    publish_tx: broadcast::Sender<String>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("🔗 New client connected: {}", addr);
                let client_controller = Arc::clone(&controller);
                let client_publish_rx = publish_tx.subscribe();

                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, client_controller, client_publish_rx).await {
                        warn!("Client {} error: {}", addr, e);
                    }
                    info!("🔌 Client {} disconnected", addr);
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    controller: Arc<Mutex<Controller>>,
    mut publish_rx: broadcast::Receiver<String>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (reader, writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);
    let writer = Arc::new(Mutex::new(writer));

    let publish_writer = Arc::clone(&writer);
    let publish_task = tokio::spawn(async move {
        loop {
            match publish_rx.recv().await {
                Ok(message) => {
                    let mut writer_guard = publish_writer.lock().await;
                    if let Err(e) = writer_guard.write_all(message.as_bytes()).await {
                        warn!("Failed to stream publish: {}", e);
                        break;
                    }
                    if let Err(e) = writer_guard.write_all(b"\n").await {
                        warn!("Failed to stream publish newline: {}", e);
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Client lagging, dropped {} published messages", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut handler = ProtocolHandler::new();
    let mut line = String::new();
    loop {
        line.clear();
        match buf_reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                let response = match handler.parse_line(trimmed) {
                    Ok(command) => {
                        debug!("📨 Received command: {:?}", command);
                        let mut guard = controller.lock().await;
                        guard.execute(command)
                    }
                    Err(e) => {
                        warn!("Failed to parse command '{}': {}", trimmed, e);
                        handler.create_parse_error_response(0, &e)
                    }
                };

                let response_json = handler.serialize_response(&response)?;
                {
                    let mut writer_guard = writer.lock().await;
                    writer_guard.write_all(response_json.as_bytes()).await?;
                    writer_guard.write_all(b"\n").await?;
                }
                debug!("📤 Sent response: {}", response_json);
            }
            Err(e) => {
                error!("Error reading from client: {}", e);
                break;
            }
        }
    }

    publish_task.abort();
    Ok(())
}
