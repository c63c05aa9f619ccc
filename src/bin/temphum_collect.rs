use esp_temphum::collect::{parse_cli, Collector};
use esp_temphum::TimeSeries;

fn main() {
    let (ip_port, iters, delay, replay, verbose) = parse_cli();

    if verbose {
        println!("ip_port {}", ip_port);
        println!("iters {}", iters);
        println!("delay {}", delay);
        println!("replay {:?}", replay);
    }

    let series = match replay {
        Some(path) => {
            println!("plotting previously saved data from {:?}", path);
            match TimeSeries::from_json(&path) {
                Ok(series) => series,
                Err(e) => {
                    println!("could not load saved data: {}", e);
                    TimeSeries::new(0)
                }
            }
        }
        None => {
            let collector = match Collector::new(&format!("http://{}", ip_port), iters, delay) {
                Ok(collector) => collector,
                Err(e) => {
                    println!("could not build the http client: {}", e);
                    return;
                }
            };
            let series = collector.collect();
            println!("\nfinal collected data:\n{}", series);
            match series.data_filename() {
                Some(fout) => match series.to_json(&fout) {
                    Ok(()) => println!("data written to {}", fout),
                    Err(e) => println!("could not save data to {}: {}", fout, e),
                },
                None => println!("no samples collected, nothing to save"),
            }
            series
        }
    };

    // always attempt to plot, an empty series plots nothing
    match series.plot_charts(".") {
        Ok(paths) => {
            for p in paths {
                println!("plotted {}", p.display());
            }
        }
        Err(e) => println!("could not plot the series: {}", e),
    }
}
