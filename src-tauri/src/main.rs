#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[cfg(feature = "desktop")]
fn main() {
    if let Err(e) = desk_pet_lib::run() {
        tracing::error!(error = %e, "desk pet exited with an error");
        eprintln!("desk-pet: {e:#}");
        std::process::exit(1);
    }
}

#[cfg(not(feature = "desktop"))]
fn main() {
    eprintln!("desk-pet was built without the `desktop` feature; nothing to run");
    std::process::exit(2);
}
