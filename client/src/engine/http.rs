//! Built-in HTTP measurement engine
//!
//! Drives the traffic server's `/__down` and `/__up` endpoints with timed
//! transfers: small downloads for idle latency and jitter, sized transfers
//! in each direction for throughput, optional latency sampling while the
//! link is saturated (bufferbloat), and a UDP STUN probe against the
//! broker-issued relay for packet loss.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures::StreamExt;
use rand::RngCore;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use speedmark_common::report::{EngineSummary, LiveMetrics};
use speedmark_common::score::Scores;
use speedmark_common::turn::{TurnCredentials, filter_udp_relay_urls};
use url::Url;

use super::{Engine, EngineConfig, EngineEvent};

const LATENCY_SAMPLES: usize = 10;
const DOWNLOAD_SIZES: [u64; 3] = [100_000, 1_000_000, 10_000_000];
const UPLOAD_SIZES: [u64; 3] = [100_000, 1_000_000, 5_000_000];
const LOADED_LATENCY_SAMPLES: usize = 5;
const LOSS_PROBE_COUNT: usize = 20;
const LOSS_PROBE_TIMEOUT: Duration = Duration::from_millis(300);

#[derive(Default)]
struct Shared {
    live: LiveMetrics,
    loaded_latency_ms: Option<f64>,
    packet_loss: Option<f64>,
    scores: Option<Scores>,
}

pub struct HttpEngine {
    config: EngineConfig,
    client: reqwest::Client,
    shared: Arc<Mutex<Shared>>,
    tx: mpsc::UnboundedSender<EngineEvent>,
    rx: Option<mpsc::UnboundedReceiver<EngineEvent>>,
    cancel_tx: watch::Sender<bool>,
    // Held so pause() can always signal, even after the run task exits.
    _cancel_rx: watch::Receiver<bool>,
}

impl HttpEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        let (tx, rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let mut engine = Self {
            config,
            client,
            shared: Arc::new(Mutex::new(Shared::default())),
            tx,
            rx: Some(rx),
            cancel_tx,
            _cancel_rx: cancel_rx,
        };
        if engine.config.auto_start {
            engine.play()?;
        }
        Ok(engine)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Shared> {
        // Poisoning cannot happen: holders never panic while locked.
        match self.shared.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Engine for HttpEngine {
    fn play(&mut self) -> Result<()> {
        let config = self.config.clone();
        let client = self.client.clone();
        let shared = self.shared.clone();
        let tx = self.tx.clone();
        let cancel = self.cancel_tx.subscribe();
        tokio::spawn(run(config, client, shared, tx, cancel));
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.cancel_tx
            .send(true)
            .map_err(|_| anyhow::anyhow!("engine is not pausable"))
    }

    fn results(&self) -> LiveMetrics {
        self.lock().live.clone()
    }

    fn packet_loss(&self) -> Option<f64> {
        self.lock().packet_loss
    }

    fn scores(&self) -> Option<Scores> {
        self.lock().scores.clone()
    }

    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<EngineEvent>> {
        self.rx.take()
    }
}

async fn run(
    config: EngineConfig,
    client: reqwest::Client,
    shared: Arc<Mutex<Shared>>,
    tx: mpsc::UnboundedSender<EngineEvent>,
    cancel: watch::Receiver<bool>,
) {
    match drive(&config, &client, &shared, &tx, &cancel).await {
        Ok(Some(summary)) => {
            let _ = tx.send(EngineEvent::Finished(summary));
        }
        // Paused: cease event delivery without a terminal signal.
        Ok(None) => {}
        Err(e) => {
            let _ = tx.send(EngineEvent::Failed(e.to_string()));
        }
    }
}

fn cancelled(cancel: &watch::Receiver<bool>) -> bool {
    *cancel.borrow()
}

fn update<F: FnOnce(&mut Shared)>(shared: &Arc<Mutex<Shared>>, f: F) {
    let mut guard = match shared.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    f(&mut guard);
}

fn notify(tx: &mpsc::UnboundedSender<EngineEvent>, phase_id: &str) {
    let _ = tx.send(EngineEvent::ResultsChanged {
        phase_id: phase_id.to_string(),
    });
}

async fn drive(
    config: &EngineConfig,
    client: &reqwest::Client,
    shared: &Arc<Mutex<Shared>>,
    tx: &mpsc::UnboundedSender<EngineEvent>,
    cancel: &watch::Receiver<bool>,
) -> Result<Option<EngineSummary>> {
    // Idle latency and jitter
    let (latency_ms, jitter_ms) =
        measure_latency(client, &config.download_url, LATENCY_SAMPLES).await?;
    update(shared, |s| {
        s.live.latency_ms = Some(latency_ms);
        s.live.jitter_ms = Some(jitter_ms);
    });
    notify(tx, "latency");
    if cancelled(cancel) {
        return Ok(None);
    }

    // Download throughput, largest transfer with concurrent latency
    // sampling when loaded latency is requested
    let mut best_download = 0.0f64;
    for (i, &size) in DOWNLOAD_SIZES.iter().enumerate() {
        let saturate_and_sample =
            config.measure_download_loaded_latency && i == DOWNLOAD_SIZES.len() - 1;
        let bps = if saturate_and_sample {
            let (bps, loaded) = tokio::join!(
                timed_download(client, &config.download_url, size),
                sample_loaded_latency(client, &config.download_url),
            );
            if let Some(loaded_ms) = loaded {
                update(shared, |s| s.loaded_latency_ms = Some(loaded_ms));
            }
            bps?
        } else {
            timed_download(client, &config.download_url, size).await?
        };
        best_download = best_download.max(bps);
        update(shared, |s| s.live.download_bps = Some(best_download));
        notify(tx, "download");
        if cancelled(cancel) {
            return Ok(None);
        }
    }

    // Upload throughput
    let mut best_upload = 0.0f64;
    for (i, &size) in UPLOAD_SIZES.iter().enumerate() {
        let saturate_and_sample =
            config.measure_upload_loaded_latency && i == UPLOAD_SIZES.len() - 1;
        let bps = if saturate_and_sample {
            let (bps, loaded) = tokio::join!(
                timed_upload(client, &config.upload_url, size),
                sample_loaded_latency(client, &config.download_url),
            );
            if let Some(loaded_ms) = loaded {
                update(shared, |s| {
                    s.loaded_latency_ms = Some(s.loaded_latency_ms.map_or(loaded_ms, |v| v.max(loaded_ms)));
                });
            }
            bps?
        } else {
            timed_upload(client, &config.upload_url, size).await?
        };
        best_upload = best_upload.max(bps);
        update(shared, |s| s.live.upload_bps = Some(best_upload));
        notify(tx, "upload");
        if cancelled(cancel) {
            return Ok(None);
        }
    }

    // Packet loss, only when a broker was configured. Probe failure is
    // not a session failure; the metric simply stays unavailable.
    if let Some(turn_url) = &config.turn_credential_url {
        let referer = page_origin(&config.download_url);
        match measure_packet_loss(client, turn_url, referer.as_deref()).await {
            Ok(Some(ratio)) => {
                update(shared, |s| s.packet_loss = Some(ratio));
                notify(tx, "packetLoss");
            }
            Ok(None) => debug!("no UDP relay available, skipping loss probe"),
            Err(e) => warn!("packet loss probe failed: {}", e),
        }
        if cancelled(cancel) {
            return Ok(None);
        }
    }

    let summary = {
        let mut guard = match shared.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let scores = compute_scores(&guard.live, guard.loaded_latency_ms, guard.packet_loss);
        guard.scores = scores;
        EngineSummary {
            download_bandwidth: guard.live.download_bps,
            upload_bandwidth: guard.live.upload_bps,
            latency: guard.live.latency_ms,
            jitter: guard.live.jitter_ms,
        }
    };

    Ok(Some(summary))
}

/// Time a batch of empty downloads. Latency is the median round trip;
/// jitter is the mean absolute delta between consecutive samples.
async fn measure_latency(
    client: &reqwest::Client,
    download_url: &str,
    samples: usize,
) -> Result<(f64, f64)> {
    let mut rtts = Vec::with_capacity(samples);
    for _ in 0..samples {
        let started = Instant::now();
        let response = client
            .get(download_url)
            .query(&[("bytes", "0")])
            .send()
            .await
            .context("latency probe failed")?
            .error_for_status()
            .context("latency probe rejected")?;
        response.bytes().await.context("latency probe read failed")?;
        rtts.push(started.elapsed().as_secs_f64() * 1000.0);
    }

    let mut sorted = rtts.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let latency = sorted[sorted.len() / 2];

    let jitter = if rtts.len() > 1 {
        rtts.windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f64>() / (rtts.len() - 1) as f64
    } else {
        0.0
    };

    Ok((latency, jitter))
}

/// Fetch one payload of the given size and return achieved bits per second.
async fn timed_download(client: &reqwest::Client, download_url: &str, size: u64) -> Result<f64> {
    let started = Instant::now();
    let response = client
        .get(download_url)
        .query(&[("bytes", size.to_string())])
        .send()
        .await
        .context("download transfer failed")?
        .error_for_status()
        .context("download transfer rejected")?;

    let mut total: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        total += chunk.context("download body interrupted")?.len() as u64;
    }

    let secs = started.elapsed().as_secs_f64();
    Ok(total as f64 * 8.0 / secs.max(1e-6))
}

/// Post a body of the given size and return achieved bits per second.
async fn timed_upload(client: &reqwest::Client, upload_url: &str, size: u64) -> Result<f64> {
    let started = Instant::now();
    client
        .post(upload_url)
        .body(upload_body(size))
        .send()
        .await
        .context("upload transfer failed")?
        .error_for_status()
        .context("upload transfer rejected")?;

    let secs = started.elapsed().as_secs_f64();
    Ok(size as f64 * 8.0 / secs.max(1e-6))
}

/// Incompressible-enough upload payload: one random kilobyte tiled.
fn upload_body(size: u64) -> Vec<u8> {
    let mut block = [0u8; 1024];
    rand::thread_rng().fill_bytes(&mut block);
    block
        .iter()
        .cycle()
        .take(size as usize)
        .copied()
        .collect()
}

/// Sample latency while a concurrent transfer saturates the link.
/// Best-effort: failed samples are simply dropped.
async fn sample_loaded_latency(client: &reqwest::Client, download_url: &str) -> Option<f64> {
    let mut rtts = Vec::with_capacity(LOADED_LATENCY_SAMPLES);
    for _ in 0..LOADED_LATENCY_SAMPLES {
        let started = Instant::now();
        let ok = async {
            client
                .get(download_url)
                .query(&[("bytes", "0")])
                .send()
                .await?
                .error_for_status()?
                .bytes()
                .await
        }
        .await
        .is_ok();
        if ok {
            rtts.push(started.elapsed().as_secs_f64() * 1000.0);
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    if rtts.is_empty() {
        None
    } else {
        Some(rtts.iter().sum::<f64>() / rtts.len() as f64)
    }
}

/// Origin of the measurement endpoint, sent as the referrer on
/// credential requests. The broker authorizes by referrer origin and
/// rejects referrer-less requests outright.
fn page_origin(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    let origin = url.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

/// Fetch relay credentials from the broker and probe the UDP relay with
/// STUN binding requests. Returns `None` when no UDP relay is usable.
async fn measure_packet_loss(
    client: &reqwest::Client,
    turn_url: &str,
    referer: Option<&str>,
) -> Result<Option<f64>> {
    let mut request = client.get(turn_url);
    if let Some(referer) = referer {
        request = request.header(reqwest::header::REFERER, referer);
    }
    let creds: TurnCredentials = request
        .send()
        .await
        .context("credential fetch failed")?
        .error_for_status()
        .context("credential fetch rejected")?
        .json()
        .await
        .context("malformed credential response")?;

    // The broker already filters, but the engine does not rely on that.
    let urls = filter_udp_relay_urls(&creds.urls);
    let Some(relay) = urls.first() else {
        return Ok(None);
    };
    let Some((host, port)) = relay_host_port(relay) else {
        debug!("unusable relay url: {}", relay);
        return Ok(None);
    };

    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .context("failed to bind probe socket")?;
    socket
        .connect((host.as_str(), port))
        .await
        .context("failed to reach relay")?;

    let mut received = 0usize;
    let mut buf = [0u8; 256];
    for _ in 0..LOSS_PROBE_COUNT {
        socket
            .send(&stun_binding_request())
            .await
            .context("probe send failed")?;
        if let Ok(Ok(n)) =
            tokio::time::timeout(LOSS_PROBE_TIMEOUT, socket.recv(&mut buf)).await
        {
            // Any STUN-cookied response counts as delivery.
            if n >= 20 && buf[4..8] == STUN_MAGIC_COOKIE {
                received += 1;
            }
        }
    }

    Ok(Some(1.0 - received as f64 / LOSS_PROBE_COUNT as f64))
}

const STUN_MAGIC_COOKIE: [u8; 4] = [0x21, 0x12, 0xA4, 0x42];

/// Minimal STUN binding request: type 0x0001, zero-length body, magic
/// cookie, random transaction id.
fn stun_binding_request() -> [u8; 20] {
    let mut packet = [0u8; 20];
    packet[0] = 0x00;
    packet[1] = 0x01;
    packet[4..8].copy_from_slice(&STUN_MAGIC_COOKIE);
    rand::thread_rng().fill_bytes(&mut packet[8..20]);
    packet
}

/// Extract host and port from a relay URL such as
/// `turn:relay.example:3478?transport=udp`. IPv6 hosts are bracketed
/// in the URL but returned bare, as the socket layer expects them.
fn relay_host_port(raw: &str) -> Option<(String, u16)> {
    let url = Url::parse(raw).ok()?;
    let path = url.path();
    let (host, port) = match path.strip_prefix('[') {
        Some(rest) => {
            let (host, rest) = rest.split_once(']')?;
            (host, rest.strip_prefix(':')?)
        }
        None => path.rsplit_once(':')?,
    };
    Some((host.to_string(), port.parse().ok()?))
}

/// Derive per-activity 0-100 scores from the measured metrics. Bandwidth
/// dominates streaming, latency dominates gaming, and real-time
/// communication adds jitter and upload sensitivity. Loss and bufferbloat
/// subtract across the board.
fn compute_scores(
    live: &LiveMetrics,
    loaded_latency_ms: Option<f64>,
    packet_loss: Option<f64>,
) -> Option<Scores> {
    let download_mbps = live.download_bps? / 1e6;
    let latency_ms = live.latency_ms?;
    let upload_mbps = live.upload_bps.map(|bps| bps / 1e6);
    let jitter_ms = live.jitter_ms;

    let bandwidth_points = |mbps: f64, target: f64| (mbps / target).min(1.0) * 100.0;
    // Full marks at 20 ms or under, zero at 300 ms.
    let latency_points = (1.0 - ((latency_ms - 20.0).max(0.0) / 280.0)).clamp(0.0, 1.0) * 100.0;

    let loss_penalty = packet_loss.unwrap_or(0.0) * 500.0;
    let bloat_penalty = loaded_latency_ms
        .map(|loaded| ((loaded - latency_ms).max(0.0) / 10.0).min(30.0))
        .unwrap_or(0.0);

    let streaming = 0.75 * bandwidth_points(download_mbps, 25.0) + 0.25 * latency_points;
    let gaming = 0.6 * latency_points + 0.4 * bandwidth_points(download_mbps, 5.0);
    let rtc = match (upload_mbps, jitter_ms) {
        (Some(up), Some(jitter)) => Some(
            0.4 * latency_points
                + 0.3 * bandwidth_points(up, 5.0)
                + 0.3 * ((1.0 - (jitter / 50.0).min(1.0)) * 100.0),
        ),
        _ => None,
    };

    let finish = |score: f64| (score - loss_penalty - bloat_penalty).clamp(0.0, 100.0);
    Some(Scores {
        streaming: Some(finish(streaming)),
        gaming: Some(finish(gaming)),
        rtc: rtc.map(finish),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn relay_host_port_parses_turn_urls() {
        assert_eq!(
            relay_host_port("turn:relay.example:3478?transport=udp"),
            Some(("relay.example".to_string(), 3478))
        );
        assert_eq!(relay_host_port("turn:relay.example"), None);
        assert_eq!(relay_host_port("not a url"), None);
    }

    #[test]
    fn relay_host_port_unwraps_bracketed_ipv6_hosts() {
        assert_eq!(
            relay_host_port("turn:[2001:db8::1]:3478?transport=udp"),
            Some(("2001:db8::1".to_string(), 3478))
        );
        assert_eq!(relay_host_port("turn:[2001:db8::1]"), None);
        assert_eq!(relay_host_port("turn:[2001:db8::1]:port"), None);
    }

    #[test]
    fn page_origin_reduces_endpoint_urls_to_their_origin() {
        assert_eq!(
            page_origin("https://speed.example/__down").as_deref(),
            Some("https://speed.example")
        );
        assert_eq!(
            page_origin("http://127.0.0.1:8080/__down").as_deref(),
            Some("http://127.0.0.1:8080")
        );
        assert_eq!(page_origin("not a url"), None);
    }

    /// Answer one HTTP request with an empty credential list, capturing
    /// the raw request head.
    async fn spawn_capturing_broker(captured: Arc<Mutex<String>>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                head.extend_from_slice(&buf[..n]);
                if n == 0 || head.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            *captured.lock().unwrap() = String::from_utf8_lossy(&head).to_string();

            let body = r#"{"urls":[],"username":"u","credential":"c"}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                 content-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{addr}/turn-credentials")
    }

    #[tokio::test]
    async fn credential_fetch_carries_the_configured_referrer() {
        let captured = Arc::new(Mutex::new(String::new()));
        let turn_url = spawn_capturing_broker(captured.clone()).await;

        let client = reqwest::Client::new();
        let loss = measure_packet_loss(&client, &turn_url, Some("https://speed.example"))
            .await
            .unwrap();
        // Empty credential list: the probe is skipped, not failed.
        assert_eq!(loss, None);

        let request_head = captured.lock().unwrap().to_lowercase();
        assert!(
            request_head.contains("referer: https://speed.example"),
            "request head: {request_head}"
        );
    }

    #[test]
    fn stun_requests_are_cookied_and_unique() {
        let a = stun_binding_request();
        let b = stun_binding_request();
        assert_eq!(a[0..2], [0x00, 0x01]);
        assert_eq!(a[4..8], STUN_MAGIC_COOKIE);
        assert_ne!(a[8..], b[8..]);
    }

    #[test]
    fn upload_body_has_exact_length_and_tiles() {
        let body = upload_body(3000);
        assert_eq!(body.len(), 3000);
        for (i, byte) in body.iter().enumerate() {
            assert_eq!(*byte, body[i % 1024]);
        }
    }

    #[test]
    fn scores_need_download_and_latency() {
        assert!(compute_scores(&LiveMetrics::default(), None, None).is_none());

        let live = LiveMetrics {
            download_bps: Some(100_000_000.0),
            upload_bps: Some(20_000_000.0),
            latency_ms: Some(10.0),
            jitter_ms: Some(1.0),
        };
        let scores = compute_scores(&live, None, None).unwrap();
        assert!(scores.streaming.unwrap() > 90.0);
        assert!(scores.gaming.unwrap() > 90.0);
        assert!(scores.rtc.unwrap() > 90.0);
    }

    #[test]
    fn loss_and_bufferbloat_drag_scores_down() {
        let live = LiveMetrics {
            download_bps: Some(100_000_000.0),
            upload_bps: Some(20_000_000.0),
            latency_ms: Some(10.0),
            jitter_ms: Some(1.0),
        };
        let clean = compute_scores(&live, None, None).unwrap();
        let lossy = compute_scores(&live, Some(150.0), Some(0.1)).unwrap();
        assert!(lossy.streaming.unwrap() < clean.streaming.unwrap());
        assert!(lossy.gaming.unwrap() < clean.gaming.unwrap());
    }
}
