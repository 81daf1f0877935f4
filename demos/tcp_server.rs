//! Broadcast a synthetic service over plain TCP
//!
//! Run with: cargo run --example tcp_server [BIND_ADDR] [CODEC]
//!
//! Examples:
//!   cargo run --example tcp_server                          # 0.0.0.0:7979, MP3
//!   cargo run --example tcp_server 127.0.0.1:7980 wav       # WAV output
//!   cargo run --example tcp_server 0.0.0.0:7979 flac --features flac
//!
//! A fake decoder task produces a 440 Hz tone and a rotating dynamic label.
//! Clients pick their mode with the first line they send:
//!
//!   live              start at the live edge
//!   catchup <BYTES>   replay from BYTES before the live edge
//!
//! With ffplay:
//!   (echo live; sleep 3600) | nc localhost 7979 | ffplay -
//!   (echo "catchup 500000"; sleep 3600) | nc localhost 7979 | ffplay -

use std::f32::consts::TAU;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dab_fanout::{BroadcastHandler, HandlerConfig, OutputCodec, ProgrammeHandler, SubscribeMode};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

const SAMPLE_RATE: u32 = 48_000;
const FRAMES_PER_BATCH: usize = 1152;
const LABELS: [&str; 3] = [
    "You are listening to the dab-fanout demo",
    "Now playing: 440 Hz sine",
    "Join late and catch up from the cache",
];

fn parse_codec(arg: &str) -> Result<OutputCodec, String> {
    match arg.to_ascii_lowercase().as_str() {
        "mp3" => Ok(OutputCodec::Mp3),
        "flac" => Ok(OutputCodec::Flac),
        "wav" => Ok(OutputCodec::Wav),
        other => Err(format!("Unknown codec '{}', expected mp3, flac or wav", other)),
    }
}

fn parse_mode(line: &str) -> Option<SubscribeMode> {
    let mut parts = line.split_whitespace();
    match parts.next()? {
        "live" => Some(SubscribeMode::Live),
        "catchup" => {
            let rewind_bytes = parts.next().map_or(Some(0), |n| n.parse().ok())?;
            Some(SubscribeMode::CatchUp { rewind_bytes })
        }
        _ => None,
    }
}

fn print_usage() {
    eprintln!("Usage: tcp_server [BIND_ADDR] [CODEC]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:7979)");
    eprintln!("  CODEC        mp3, flac or wav (default: mp3)");
}

/// Stand-in for the DAB decoder: a tone plus a label that changes every 10 s
async fn run_fake_decoder(handler: Arc<BroadcastHandler>) {
    let batch_duration = Duration::from_secs_f64(FRAMES_PER_BATCH as f64 / SAMPLE_RATE as f64);
    let mut ticker = tokio::time::interval(batch_duration);
    let mut phase = 0.0f32;
    let step = TAU * 440.0 / SAMPLE_RATE as f32;
    let mut batches = 0u64;

    loop {
        ticker.tick().await;

        let mut samples = Vec::with_capacity(FRAMES_PER_BATCH * 2);
        for _ in 0..FRAMES_PER_BATCH {
            let value = (phase.sin() * 8000.0) as i16;
            samples.push(value);
            samples.push(value);
            phase = (phase + step) % TAU;
        }
        handler.on_new_audio(samples, SAMPLE_RATE, "Stereo").await;

        let label = LABELS[(batches / 400) as usize % LABELS.len()];
        handler.on_new_dynamic_label(label).await;

        batches += 1;
        if batches % 2000 == 0 {
            let stats = handler.stats().await;
            tracing::info!(
                live = stats.live_subscribers,
                catch_up = stats.catch_up_subscribers,
                cached_bytes = stats.cache_len,
                evicted_bytes = stats.bytes_evicted(),
                bitrate = stats.bitrate(),
                "Service stats"
            );
        }
    }
}

async fn handle_client(handler: Arc<BroadcastHandler>, socket: TcpStream, peer: SocketAddr) {
    let _ = socket.set_nodelay(true);
    let (read_half, write_half) = socket.into_split();

    let mut line = String::new();
    let mut reader = BufReader::new(read_half);
    if let Err(e) = reader.read_line(&mut line).await {
        tracing::debug!(peer = %peer, error = %e, "Failed to read request line");
        return;
    }

    let Some(mode) = parse_mode(line.trim()) else {
        tracing::warn!(peer = %peer, request = line.trim(), "Unrecognised request");
        return;
    };

    tracing::info!(peer = %peer, mode = ?mode, "Client connected");
    let id = handler.serve(Box::new(write_half), mode).await;
    tracing::info!(peer = %peer, subscriber = %id, "Client disconnected");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let bind_addr: SocketAddr = args.get(1).map_or("0.0.0.0:7979", String::as_str).parse()?;
    let codec = match args.get(2).map(|c| parse_codec(c)).transpose() {
        Ok(codec) => codec.unwrap_or(OutputCodec::Mp3),
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dab_fanout=debug".parse()?)
                .add_directive("tcp_server=debug".parse()?),
        )
        .init();

    // Two minutes of catch-up at 192 kbit/s
    let config = HandlerConfig::from_playback_window(Duration::from_secs(120), 24_000);
    let handler = Arc::new(BroadcastHandler::new(0x4daa, codec, config)?);

    let listener = TcpListener::bind(bind_addr).await?;
    println!("Broadcasting {} on {}", codec, bind_addr);
    println!("Send 'live' or 'catchup <BYTES>' as the first line");

    let decoder = tokio::spawn(run_fake_decoder(Arc::clone(&handler)));

    let accept_loop = async {
        loop {
            match listener.accept().await {
                Ok((socket, peer)) => {
                    tokio::spawn(handle_client(Arc::clone(&handler), socket, peer));
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    };

    tokio::select! {
        _ = accept_loop => {}
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
    }

    decoder.abort();
    handler.cancel_all().await;

    Ok(())
}
