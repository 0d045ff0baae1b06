//! voxorb command-line frontend: device listing, VAD simulation, live
//! listening, and the push-to-toggle talk loop.

mod cli_utils;
mod listen;
mod talk;

use anyhow::Result;
use std::panic;
use voxorb::config::AppConfig;
use voxorb::{init_logging, log_debug, log_file_path, log_panic};

use crate::cli_utils::{list_input_devices, run_simulation};

fn main() -> Result<()> {
    let config = AppConfig::parse_args()?;

    if config.list_input_devices {
        list_input_devices()?;
        return Ok(());
    }

    if let Some(levels) = config.simulate_vad.as_deref() {
        return run_simulation(&config, levels);
    }

    init_logging(&config);
    let previous_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        log_panic(info);
        previous_hook(info);
    }));
    log_debug("=== voxorb started ===");
    log_debug(&format!("Log file: {:?}", log_file_path()));

    if config.listen {
        return listen::run_listen(&config);
    }
    if config.talk {
        return talk::run_talk(&config);
    }

    println!("Nothing to do. Try --listen, --talk, --simulate-vad, or --help.");
    Ok(())
}
