//! Server metrics over plain HTTP
//!
//! `/metrics` serves Prometheus text, `/metrics/json` the same snapshot as
//! JSON, `/health` a liveness probe.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Tick samples kept for percentiles
const TICK_HISTORY: usize = 1000;

/// Live counters shared between the tick thread and the HTTP endpoint
#[derive(Debug)]
pub struct Metrics {
    // Simulation population
    pub players: AtomicU64,
    pub spectators: AtomicU64,
    pub entities: AtomicU64,
    pub active_projectiles: AtomicU64,

    // Tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_p99_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub tick_count: AtomicU64,

    // Network stats
    pub connections_active: AtomicU64,
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    pub decode_errors: AtomicU64,

    start_time: Instant,
    tick_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            players: AtomicU64::new(0),
            spectators: AtomicU64::new(0),
            entities: AtomicU64::new(0),
            active_projectiles: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_p99_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(TICK_HISTORY)),
        }
    }

    /// Record a tick time and refresh the rolling percentiles
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        if history.len() == TICK_HISTORY {
            history.pop_front();
        }
        history.push_back(us);
        if history.len() < 10 {
            return;
        }

        let mut sorted: Vec<u64> = history.iter().copied().collect();
        sorted.sort_unstable();
        self.tick_time_p95_us.store(percentile(&sorted, 0.95), Ordering::Relaxed);
        self.tick_time_p99_us.store(percentile(&sorted, 0.99), Ordering::Relaxed);
        self.tick_time_max_us.store(percentile(&sorted, 1.0), Ordering::Relaxed);
    }

    /// One outbound message per client and tick
    pub fn record_sent(&self, messages: u64, bytes: u64) {
        self.messages_sent.fetch_add(messages, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_received(&self, bytes: u64) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |value: &AtomicU64| value.load(Ordering::Relaxed);
        MetricsSnapshot {
            simulation: SimulationStats {
                players: load(&self.players),
                spectators: load(&self.spectators),
                entities: load(&self.entities),
                active_projectiles: load(&self.active_projectiles),
            },
            performance: TickStats {
                tick_time_us: load(&self.tick_time_us),
                tick_time_p95_us: load(&self.tick_time_p95_us),
                tick_time_p99_us: load(&self.tick_time_p99_us),
                tick_time_max_us: load(&self.tick_time_max_us),
                tick_count: load(&self.tick_count),
            },
            network: NetworkStats {
                connections: load(&self.connections_active),
                messages_sent: load(&self.messages_sent),
                messages_received: load(&self.messages_received),
                bytes_sent: load(&self.bytes_sent),
                bytes_received: load(&self.bytes_received),
                decode_errors: load(&self.decode_errors),
            },
            uptime_seconds: self.uptime_seconds(),
        }
    }

    /// Prometheus text exposition format
    pub fn to_prometheus(&self) -> String {
        let snap = self.snapshot();
        let (sim, perf, net) = (&snap.simulation, &snap.performance, &snap.network);
        let families: [(&str, &str, &str, u64); 16] = [
            ("players", "Clients controlling a player", GAUGE, sim.players),
            ("spectators", "Clients spectating", GAUGE, sim.spectators),
            ("entities", "Live entities including pooled projectiles", GAUGE, sim.entities),
            ("projectiles_active", "Projectiles in flight", GAUGE, sim.active_projectiles),
            ("tick_time_microseconds", "Last tick time in microseconds", GAUGE, perf.tick_time_us),
            ("tick_time_p95_microseconds", "95th percentile tick time", GAUGE, perf.tick_time_p95_us),
            ("tick_time_p99_microseconds", "99th percentile tick time", GAUGE, perf.tick_time_p99_us),
            ("tick_time_max_microseconds", "Slowest tick in the window", GAUGE, perf.tick_time_max_us),
            ("tick_count", "Total ticks processed", COUNTER, perf.tick_count),
            ("connections_active", "Open client connections", GAUGE, net.connections),
            ("messages_sent_total", "Outbound messages, one per client per tick", COUNTER, net.messages_sent),
            ("messages_received_total", "Inbound messages", COUNTER, net.messages_received),
            ("bytes_sent_total", "Outbound bytes", COUNTER, net.bytes_sent),
            ("bytes_received_total", "Inbound bytes", COUNTER, net.bytes_received),
            ("decode_errors_total", "Inbound messages discarded as malformed", COUNTER, net.decode_errors),
            ("uptime_seconds", "Server uptime in seconds", COUNTER, snap.uptime_seconds),
        ];

        let mut output = String::with_capacity(2048);
        for (name, help, kind, value) in families {
            let _ = write!(
                output,
                "# HELP skirmish_{name} {help}\n# TYPE skirmish_{name} {kind}\nskirmish_{name} {value}\n"
            );
        }
        output
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.snapshot()).unwrap_or_default()
    }
}

const GAUGE: &str = "gauge";
const COUNTER: &str = "counter";

/// Nearest-rank percentile of an ascending, non-empty slice
fn percentile(sorted: &[u64], q: f32) -> u64 {
    let idx = (sorted.len() as f32 * q) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Point-in-time copy of every counter, shaped like the JSON endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub simulation: SimulationStats,
    pub performance: TickStats,
    pub network: NetworkStats,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationStats {
    pub players: u64,
    pub spectators: u64,
    pub entities: u64,
    pub active_projectiles: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickStats {
    pub tick_time_us: u64,
    pub tick_time_p95_us: u64,
    pub tick_time_p99_us: u64,
    pub tick_time_max_us: u64,
    pub tick_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkStats {
    pub connections: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub decode_errors: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    )
}

/// Response for one raw HTTP request
fn route(metrics: &Metrics, request: &str) -> String {
    // Longest prefix first: /metrics would also match /metrics/json
    if request.starts_with("GET /metrics/json") {
        http_response("200 OK", "application/json", &metrics.to_json())
    } else if request.starts_with("GET /metrics") {
        http_response("200 OK", "text/plain; version=0.0.4", &metrics.to_prometheus())
    } else if request.starts_with("GET /health") {
        http_response("200 OK", "text/plain", "OK")
    } else {
        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);
                    let response = route(&metrics, &request);
                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}
