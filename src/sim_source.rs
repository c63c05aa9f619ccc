use super::VERSION;
use chrono::prelude::*;
use clap::{Arg, Command};
use rand::Rng;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Simulated sensor endpoint answering GET /get_data with
/// randomly generated readings in the fixed per-sensor ranges.
/// Explicitly constructed and stopped, one request per connection.
pub struct SimSource {
    listener: TcpListener,
    addr: SocketAddr,
}

impl SimSource {
    pub fn bind(addr: &str) -> std::io::Result<SimSource> {
        let listener = TcpListener::bind(addr)?;
        // non-blocking accept so the run loop can observe the stop flag
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        Ok(SimSource { listener, addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Accept and answer requests until the stop flag is raised.
    pub fn run(self, stop: Arc<AtomicBool>) {
        while !stop.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    if let Err(e) = handle_request(stream) {
                        println!("could not answer request: {}", e);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(25));
                }
                Err(e) => println!("could not accept connection: {}", e),
            }
        }
    }

    /// Serve from a background thread; stop and join through the handle.
    pub fn start(self) -> SimHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let addr = self.addr;
        let run_stop = Arc::clone(&stop);
        let join = std::thread::spawn(move || self.run(run_stop));
        SimHandle { stop, join, addr }
    }
}

pub struct SimHandle {
    stop: Arc<AtomicBool>,
    join: JoinHandle<()>,
    addr: SocketAddr,
}

impl SimHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn stop(self) {
        self.stop.store(true, Ordering::Relaxed);
        if self.join.join().is_err() {
            println!("simulated source thread panicked");
        }
    }
}

fn handle_request(mut stream: TcpStream) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let n = stream.read(&mut buf)?;
    let request = String::from_utf8_lossy(&buf[..n]);
    let response = if request.starts_with("GET /get_data") {
        let body = reading_body();
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    } else {
        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_owned()
    };
    stream.write_all(response.as_bytes())
}

/// One reading in the canonical wire shape, values rounded to 2 decimals:
/// three temperature sensors in disjoint ranges and three humidity
/// sensors in a shared range, stamped with the local time.
fn reading_body() -> String {
    let mut rng = rand::thread_rng();
    let temp = vec![
        round2(rng.gen_range(-10.0..=10.0)),
        round2(rng.gen_range(10.1..=20.0)),
        round2(rng.gen_range(20.1..=40.0)),
    ];
    let humidity: Vec<f64> = (0..3).map(|_| round2(rng.gen_range(40.0..=60.0))).collect();
    let timestamp = Local::now().format("%Y-%m-%dT%H:%M:%S").to_string();
    serde_json::json!({
        "timestamp": timestamp,
        "temp": temp,
        "humidity": humidity,
    })
    .to_string()
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Takes the CLI arguments to control the simulated sensor server.
pub fn parse_cli() -> String {
    let arg_listen = Arg::new("listen")
        .help("address and port to listen on (host:port)")
        .short('l')
        .long("listen")
        .num_args(1)
        .default_value("0.0.0.0:8088");
    let cli_args = Command::new("temphum_sim")
        .version(VERSION.unwrap_or("unknown"))
        .about("simulated temp/humidity sensor server")
        .arg(arg_listen)
        .get_matches();
    cli_args.get_one::<String>("listen").unwrap().to_owned()
}
