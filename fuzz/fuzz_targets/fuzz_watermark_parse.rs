//! Fuzz target for watermark parsing.
//!
//! Arbitrary state-file values must never panic the parser, and anything
//! that parses must survive a trip through the canonical form.

#![no_main]

use index_replicator::Watermark;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: &str| {
    if let Some(wm) = Watermark::parse(input) {
        let canonical = wm.to_canonical_string();
        assert_eq!(Watermark::parse(&canonical), Some(wm));
    }
});
