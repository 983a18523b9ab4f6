// Nginx Reaper - Main entry point

use nginx_reaper::config::{init_logger, Settings};
use nginx_reaper::daemon;
use std::process;

fn main() {
    // Parse errors of the environment are logged, so the logger comes first.
    init_logger();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {e:#}");
            process::exit(1);
        }
    };
    settings.log_level.apply();

    if let Err(e) = daemon::run(&settings) {
        eprintln!("Fatal error: {e:#}");
        process::exit(1);
    }
}
