// Motor check: careful, step-by-step test of both H-bridges
//
// Usage: cargo run --example motor_check -- [pwm_chip]
// Example: cargo run --example motor_check -- 0
//
// Safety features:
// - Explicit confirmation before every maneuver
// - Creep speed first
// - Both axes reset to neutral after each step and on exit

use rover_runtime::config::Wiring;
use rover_runtime::motor::{
    Actuators, Maneuver, MotionController, SteerDirection, SysfsPeripheral,
};
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

fn confirm(prompt: &str) -> bool {
    print!("{} [y/N]: ", prompt);
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return false;
    }
    input.trim().eq_ignore_ascii_case("y")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap()),
        )
        .init();

    let pwm_chip: u32 = std::env::args()
        .nth(1)
        .map(|s| s.parse())
        .transpose()?
        .unwrap_or(0);
    let wiring = Wiring::default();

    println!("Rover motor check (WITH WRITES)");
    println!("This tool WILL drive both motors. Put the rover on blocks first!");
    println!();
    println!("PWM chip: {}", pwm_chip);
    println!("Wiring: {:?}", wiring);
    println!();

    if !confirm("Are the wheels OFF THE GROUND?") {
        println!("Please elevate the rover so the wheels can spin freely.");
        return Ok(());
    }

    // ========== STEP 1: Initialize ==========
    println!("Step 1: Initializing actuators (standby low until all pins are configured)...");
    let mut actuators = Actuators::new(SysfsPeripheral::new(pwm_chip), wiring);
    if let Err(e) = actuators.initialize() {
        println!("  ✗ Initialization failed: {}", e);
        return Err(e.into());
    }
    println!("  ✓ Actuators initialized, all axes neutral");
    println!();

    let shared = actuators.into_shared();
    let mut controller = MotionController::new(shared.clone(), Arc::new(AtomicBool::new(false)));

    // ========== STEP 2: Maneuvers ==========
    let tests = [
        ("Creep forward", Maneuver::creep(true)),
        ("Forward", Maneuver::straight(true)),
        ("Backward", Maneuver::straight(false)),
        ("Left turn", Maneuver::turn(SteerDirection::Left)),
        ("Right turn", Maneuver::turn(SteerDirection::Right)),
        ("Stop (brake)", Maneuver::stop()),
    ];

    for (name, maneuver) in tests {
        if !confirm(&format!("Run {} for {:?}?", name, maneuver.duration)) {
            println!("  Skipped");
            continue;
        }
        controller.execute(&maneuver).await?;
        println!("  ✓ {} done, state: {:?}", name, shared.lock().state());
    }

    // ========== FINAL: Disable ==========
    println!();
    println!("Step 3: Lowering standby...");
    shared.lock().set_enabled(false)?;
    println!("  ✓ Actuators disabled");

    Ok(())
}
