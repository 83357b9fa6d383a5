// Keyboard teleop: W/S drive, A/D turn, space stop, Q quit
//
// Writes one command digit per key press to the serial link the rover listens on.
//
// Usage: cargo run --example teleop -- [port]
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use rover_runtime::config::SERIAL_PORT;
use rover_runtime::link::{Link, SerialLink};
use rover_runtime::messages::CommandCode;
use std::time::Duration;
use tracing::{info, warn};

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| SERIAL_PORT.to_string());

    let mut link = SerialLink::open(&port)?;
    info!("Controls: W/S=forward/backward, A/D=left/right, SPACE=stop, Q=quit");

    enable_raw_mode()?;
    let result = run_teleop(&mut link);
    disable_raw_mode()?;

    result
}

fn key_to_command(code: KeyCode) -> Option<CommandCode> {
    match code {
        KeyCode::Char('w') | KeyCode::Up => Some(CommandCode::Forward),
        KeyCode::Char('s') | KeyCode::Down => Some(CommandCode::Backward),
        KeyCode::Char('a') | KeyCode::Left => Some(CommandCode::Left),
        KeyCode::Char('d') | KeyCode::Right => Some(CommandCode::Right),
        KeyCode::Char(' ') => Some(CommandCode::Stop),
        _ => None,
    }
}

fn run_teleop(link: &mut SerialLink) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    loop {
        // Echo whatever the rover sends back (ready message, RSSI echoes)
        while link.wait_for_data(Duration::ZERO)? {
            let byte = link.read_byte()?;
            if byte.is_ascii_graphic() {
                print!("{}", byte as char);
            }
        }

        if !event::poll(Duration::from_millis(20))? {
            continue;
        }
        let Event::Key(KeyEvent { code, kind, .. }) = event::read()? else {
            continue;
        };
        if kind != KeyEventKind::Press {
            continue;
        }

        match code {
            KeyCode::Char('q') | KeyCode::Esc => break,
            other => match key_to_command(other) {
                Some(cmd) => {
                    info!("Sending {}", cmd);
                    link.write_all(&[cmd.as_byte()])?;
                    link.flush()?;
                }
                None => warn!("Unmapped key {:?}", other),
            },
        }
    }

    Ok(())
}
