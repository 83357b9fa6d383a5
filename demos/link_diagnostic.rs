// Link diagnostic: READ-ONLY check of the radio's AT command mode
//
// Does not touch the actuators. Runs a few telemetry cycles and prints the
// received signal strength of each.
//
// Usage: cargo run --example link_diagnostic -- [port] [cycles]

use rover_runtime::config::SERIAL_PORT;
use rover_runtime::link::SerialLink;
use rover_runtime::telemetry::{PollOutcome, TelemetryPoller};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debug".parse().unwrap()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let port = args.next().unwrap_or_else(|| SERIAL_PORT.to_string());
    let cycles: u32 = args.next().map(|s| s.parse()).transpose()?.unwrap_or(5);

    println!("Serial port: {}", port);
    println!();

    println!("Step 1: Opening serial port...");
    let mut link = match SerialLink::open(&port) {
        Ok(link) => {
            println!("  ✓ Serial port opened successfully");
            link
        }
        Err(e) => {
            println!("  ✗ Failed to open serial port: {}", e);
            println!();
            println!("Troubleshooting:");
            println!("  - Check the port path is correct");
            println!("  - Make sure the rover runtime is not holding the port");
            return Err(e.into());
        }
    };
    println!();

    println!("Step 2: Polling link quality {} times...", cycles);
    let mut poller = TelemetryPoller::new();
    let mut readings = 0;
    for i in 1..=cycles {
        match poller.poll(&mut link) {
            Ok(PollOutcome::Reading(rssi)) => {
                readings += 1;
                println!("  [{}] ✓ RSSI {}", i, rssi);
            }
            Ok(PollOutcome::NoValue) => println!("  [{}] ? query acknowledged, no value", i),
            Ok(PollOutcome::Unparseable(text)) => println!("  [{}] ✗ unparseable {:?}", i, text),
            Ok(PollOutcome::NoCommandMode) => println!("  [{}] ✗ no OK for escape sequence", i),
            Err(e) => println!("  [{}] ✗ {}", i, e),
        }
    }
    println!();
    println!("{} of {} cycles produced a reading (link {:?})", readings, cycles, poller.health());

    Ok(())
}
