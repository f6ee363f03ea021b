use std::sync::Once;

use env_logger::Builder;
use log::LevelFilter;

static INIT: Once = Once::new();

/// Install an `env_logger` backend once per process. `RUST_LOG` overrides
/// the defaults below.
pub fn initialize_logger() {
    // call_once_force so a panicked earlier attempt does not wedge the Once.
    INIT.call_once_force(|_| {
        let mut builder = Builder::new();

        builder
            .filter_level(LevelFilter::Info)
            .filter_module("bucket_table", LevelFilter::Info)
            .format_timestamp_millis()
            .parse_default_env();

        // Another logger may already be installed by the host program.
        let _ = builder.try_init();
    });
}
