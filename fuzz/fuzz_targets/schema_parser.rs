//! Fuzz target for `@schema` declarations.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_schema_parser
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use quarry_schema::SchemaRegistry;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Parsing and validation should only ever return errors
        let mut registry = SchemaRegistry::new();
        let _ = registry.load(input);
    }
});
