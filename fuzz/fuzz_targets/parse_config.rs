#![no_main]

use libfuzzer_sys::fuzz_target;
use modelbench_app::{SettingsOverrides, parse_config, resolve_settings};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(cfg) = parse_config(s) {
            let _ = resolve_settings(&cfg, &SettingsOverrides::default());
        }
    }
});
