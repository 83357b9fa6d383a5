use clap::Parser;
use tracing_subscriber::EnvFilter;

use rover_runtime::config::{BrakeMode, SERIAL_PORT, Wiring};
use rover_runtime::runtime::{self, RuntimeOptions};

/// Drive the rover from serial commands while polling link quality
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Serial device carrying commands and AT telemetry
    #[arg(short, long, default_value = SERIAL_PORT)]
    port: String,

    /// Use simulated actuators instead of sysfs GPIO/PWM
    #[arg(long)]
    simulate: bool,

    /// How the stop command brings the drive motor to rest
    #[arg(long, value_enum, default_value_t = BrakeMode::Active)]
    brake: BrakeMode,

    /// sysfs PWM chip index for the drive and steering channels
    #[arg(long, default_value_t = 0)]
    pwm_chip: u32,

    /// Print the active wiring as JSON and exit
    #[arg(long)]
    print_wiring: bool,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args = Args::parse();
    let wiring = Wiring::default().with_brake(args.brake);

    if args.print_wiring {
        match serde_json::to_string_pretty(&wiring) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Failed to encode wiring: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let options = RuntimeOptions {
        port: args.port,
        wiring,
        simulate: args.simulate,
        pwm_chip: args.pwm_chip,
    };

    // The serial loop may still be blocked in a read, so leave through exit()
    match runtime::run(options).await {
        Ok(reason) => std::process::exit(reason.exit_code()),
        Err(e) => {
            eprintln!("Runtime error: {}", e);
            std::process::exit(1);
        }
    }
}
