//! Fuzz target for the statement parser.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_dsl_parser
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use quarry_query::parse_program;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Errors are fine, panics are not
        let _ = parse_program(input);
    }
});
