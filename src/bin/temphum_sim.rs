use esp_temphum::sim_source::{parse_cli, SimSource};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn main() {
    let listen = parse_cli();
    let sim = match SimSource::bind(&listen) {
        Ok(sim) => sim,
        Err(e) => {
            println!("could not bind to {}: {}", listen, e);
            return;
        }
    };
    println!("simulated sensor source listening on {}", sim.local_addr());
    // serve until the process is terminated
    sim.run(Arc::new(AtomicBool::new(false)));
}
