#![no_main]

use libfuzzer_sys::fuzz_target;

use infrastructure::config::AuditorConfig;

// Fuzz the configuration parser with arbitrary YAML input.
//
// Exercises serde_yaml_ng deserialization, AuditorConfig::validate() and
// the environment override parsers. Must never panic.
fuzz_target!(|data: &[u8]| {
    // Only try UTF-8 valid strings (YAML requires valid text)
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    // Limit input size to avoid excessive parsing time
    if text.len() > 64 * 1024 {
        return;
    }

    if let Ok(config) = AuditorConfig::from_yaml(text) {
        let run = config.run_config();
        assert!(run.max_deletion_percentage.is_finite());
        assert!((0.0..=1.0).contains(&run.similarity_threshold));
    }

    // The same bytes as every override value at once.
    let mut config = AuditorConfig::default();
    let _ = config.apply_env_overrides_from(|_| Some(text.to_string()));
});
