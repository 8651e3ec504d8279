//! ParityStore Controller
//!
//! Daemon that stripes files across HTTP disk nodes with XOR parity.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     ParityStore Controller                       │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │     Node     │───▶│   Cluster    │───▶│     File     │       │
//! │  │   Monitor    │    │  Controller  │    │ Distributor  │       │
//! │  │   (Eyes)     │    │   (Brain)    │    │   (Hands)    │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use paritystore::adapters::{HttpNodeConfig, HttpNodeTransport, LoggingEventPublisher};
use paritystore::config::ClusterConfig;
use paritystore::controller::ClusterController;
use paritystore::error::{Error, Result};
use paritystore::metrics;
use paritystore::monitor::NodeMonitorConfig;
use paritystore::raid::DistributorConfig;

// =============================================================================
// CLI Arguments
// =============================================================================

/// ParityStore - RAID5-style striping across networked disk nodes
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Disk node base URLs in stripe order, comma separated
    #[arg(long, env = "NODES", value_delimiter = ',', required = true)]
    nodes: Vec<String>,

    /// Block size in bytes every node must report
    #[arg(long, env = "BLOCK_SIZE", default_value = "4096")]
    block_size: u64,

    /// Capacity in bytes every node must report
    #[arg(long, env = "NODE_CAPACITY_BYTES", default_value = "1073741824")]
    node_capacity_bytes: u64,

    /// Node polling interval in seconds
    #[arg(long, env = "POLL_INTERVAL_SECONDS", default_value = "5")]
    poll_interval_seconds: u64,

    /// Status probe timeout in milliseconds
    #[arg(long, env = "PROBE_TIMEOUT_MS", default_value = "2000")]
    probe_timeout_ms: u64,

    /// Block transfer timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECONDS", default_value = "10")]
    request_timeout_seconds: u64,

    /// Full RAID5 stripe width; fewer available nodes means degraded mode
    #[arg(long, env = "CANONICAL_WIDTH", default_value = "4")]
    canonical_width: usize,

    /// Extra attempts for a failed block store
    #[arg(long, env = "WRITE_RETRIES", default_value = "1")]
    write_retries: u32,

    /// Do not write recovered blocks back during downloads
    #[arg(long, env = "NO_SELF_HEAL")]
    no_self_heal: bool,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn cluster_config(&self) -> ClusterConfig {
        let mut config = ClusterConfig::uniform(
            self.nodes.iter().map(|n| n.trim().to_string()),
            self.block_size,
            self.node_capacity_bytes,
        );
        config.monitor = NodeMonitorConfig {
            poll_interval: Duration::from_secs(self.poll_interval_seconds),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
        };
        config.distributor = DistributorConfig {
            canonical_width: self.canonical_width,
            self_heal: !self.no_self_heal,
            write_retries: self.write_retries,
        };
        config.http = HttpNodeConfig {
            request_timeout: Duration::from_secs(self.request_timeout_seconds),
            ..Default::default()
        };
        config
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args)?;

    let config = args.cluster_config();

    info!("Starting ParityStore controller");
    info!("  Nodes: {}", args.nodes.join(", "));
    info!("  Block size: {} bytes", args.block_size);
    info!("  Canonical stripe width: {}", args.canonical_width);
    info!("  Poll interval: {}s", args.poll_interval_seconds);
    info!("  Self-heal: {}", !args.no_self_heal);

    let transport = Arc::new(HttpNodeTransport::new(config.http.clone())?);
    let publisher = Arc::new(LoggingEventPublisher::new());

    let controller = ClusterController::new(config, transport, publisher).map_err(|e| {
        error!("Invalid cluster configuration: {}", e);
        e
    })?;

    let initial = controller.refresh_nodes().await;
    info!(
        available = initial.available.len(),
        configured = controller.monitor().configured_nodes().len(),
        "Initial node probe complete"
    );

    let tasks = controller.spawn_background();

    // Start health server
    let health_addr = args.health_addr.clone();
    let health_controller = Arc::clone(&controller);
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr, health_controller).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr).await {
            error!("Metrics server error: {}", e);
        }
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }

    controller.shutdown();
    tasks.join().await;

    info!("Controller shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn"] {
        filter = filter.add_directive(
            directive
                .parse::<Directive>()
                .map_err(|e| Error::Config(format!("Invalid log directive {}: {}", directive, e)))?,
        );
    }

    let result = if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init()
    };

    result.map_err(|e| Error::Internal(format!("Failed to initialize logging: {}", e)))
}

// =============================================================================
// HTTP Servers
// =============================================================================

mod responses {
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::header::{HeaderValue, CONTENT_TYPE};
    use hyper::{Response, StatusCode};

    pub type HttpResponse = Response<Full<Bytes>>;

    pub fn respond(status: StatusCode, body: impl Into<Bytes>) -> HttpResponse {
        let mut response = Response::new(Full::new(body.into()));
        *response.status_mut() = status;
        response
    }

    pub fn with_content_type(mut response: HttpResponse, content_type: &str) -> HttpResponse {
        if let Ok(value) = HeaderValue::from_str(content_type) {
            response.headers_mut().insert(CONTENT_TYPE, value);
        }
        response
    }
}

// =============================================================================
// Health Server
// =============================================================================

async fn run_health_server(addr: &str, controller: Arc<ClusterController>) -> Result<()> {
    use hyper::body::Incoming;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, StatusCode};
    use hyper_util::rt::TokioIo;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    async fn health_handler(
        req: Request<Incoming>,
        controller: Arc<ClusterController>,
    ) -> std::result::Result<responses::HttpResponse, std::convert::Infallible> {
        let response = match req.uri().path() {
            "/healthz" | "/livez" => responses::respond(StatusCode::OK, "ok"),
            "/readyz" if controller.is_ready() => responses::respond(StatusCode::OK, "ok"),
            "/readyz" => responses::respond(StatusCode::SERVICE_UNAVAILABLE, "insufficient nodes"),
            _ => responses::respond(StatusCode::NOT_FOUND, "not found"),
        };
        Ok(response)
    }

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Config(format!("Invalid health server address: {}", e)))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind health server: {}", e)))?;

    info!("Health server listening on {}", addr);

    loop {
        let (stream, _) = listener
            .accept()
            .await
            .map_err(|e| Error::Internal(format!("Health server accept error: {}", e)))?;

        let io = TokioIo::new(stream);
        let controller = Arc::clone(&controller);

        tokio::spawn(async move {
            let service = service_fn(move |req| health_handler(req, Arc::clone(&controller)));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("Health server connection error: {}", e);
            }
        });
    }
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: &str) -> Result<()> {
    use hyper::body::Incoming;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, StatusCode};
    use hyper_util::rt::TokioIo;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    async fn metrics_handler(
        req: Request<Incoming>,
    ) -> std::result::Result<responses::HttpResponse, std::convert::Infallible> {
        let response = match req.uri().path() {
            "/metrics" => match metrics::gather_text() {
                Ok((content_type, body)) => {
                    responses::with_content_type(responses::respond(StatusCode::OK, body), &content_type)
                }
                Err(e) => {
                    error!("{}", e);
                    responses::respond(StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable")
                }
            },
            _ => responses::respond(StatusCode::NOT_FOUND, "not found"),
        };
        Ok(response)
    }

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Config(format!("Invalid metrics server address: {}", e)))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind metrics server: {}", e)))?;

    info!("Metrics server listening on {}", addr);

    loop {
        let (stream, _) = listener
            .accept()
            .await
            .map_err(|e| Error::Internal(format!("Metrics server accept error: {}", e)))?;

        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(metrics_handler))
                .await
            {
                error!("Metrics server connection error: {}", e);
            }
        });
    }
}
