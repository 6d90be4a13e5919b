//! Fuzz target for config loading and validation.

#![no_main]

use index_replicator::ReplicationConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    // Parse errors are expected; panics are not.
    if let Ok(config) = ReplicationConfig::from_json_str(text) {
        let _ = config.validate();
        let _ = config.backoff_config();
        let _ = config.settings.default_watermark_value();
    }
});
