//! Fuzz target for `quarry.toml` parsing.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_config_parser
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use quarry_schema::QuarryConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if let Ok(config) = input.parse::<QuarryConfig>() {
            let _ = config.with_environment("production");
        }
    }
});
