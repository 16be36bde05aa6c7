#![no_main]

use libfuzzer_sys::fuzz_target;
use opsctx_cli::parse_context_config;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    if let Ok(config) = parse_context_config(&raw) {
        let settings = config.source_settings();
        assert!(!settings.registry.base_url.ends_with('/'));
        assert!(!settings.tickets.base_url.ends_with('/'));
    }
});
