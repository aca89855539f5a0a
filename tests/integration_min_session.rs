// Drives the compiled binary through a PTY, exercising the real event loop
// and crossterm input handling.
//
// Requires a TTY, so it is Unix-only and ignored by default.
// Run manually via: `cargo test --test integration_min_session -- --ignored`.

#![cfg(unix)]

use std::time::Duration;

use expectrl::{spawn, Eof};

#[test]
#[ignore]
fn confirm_then_quit() -> Result<(), Box<dyn std::error::Error>> {
    let bin = assert_cmd::cargo::cargo_bin("flashread");
    let cmd = format!("{} --mute -p hi", bin.display());

    let mut p = spawn(cmd)?;
    std::thread::sleep(Duration::from_millis(200));

    // input -> confirm
    p.send("\r")?;
    std::thread::sleep(Duration::from_millis(200));

    p.send("\x1b")?; // ESC
    p.expect(Eof)?;
    Ok(())
}
