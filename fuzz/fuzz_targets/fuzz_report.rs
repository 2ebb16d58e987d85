#![no_main]

use libfuzzer_sys::fuzz_target;

use domain::cleanup::safety::check_safety_cap;
use domain::detection::engine::cosine_similarity;
use domain::report::entity::AuditReport;

// Fuzz the report path: decoding stored reports, the safety cap and the
// similarity measure.
//
// Layout:
//   [0]    = selector (0=report JSON, 1=safety cap, 2=cosine similarity)
//   rest   = payload for the selected sub-target
fuzz_target!(|data: &[u8]| {
    let Some((selector, rest)) = data.split_first() else {
        return;
    };

    match selector % 3 {
        // Sub-target 0: reports read back from the document store
        0 => {
            if let Ok(report) = serde_json::from_slice::<AuditReport>(rest) {
                let _ = report.summary_text();
                let _ = report.total_inconsistencies();
            }
        }

        // Sub-target 1: safety cap never panics and never allows past the cap
        1 => {
            if rest.len() < 24 {
                return;
            }
            let affected = u64::from_le_bytes(rest[0..8].try_into().unwrap_or_default());
            let total = u64::from_le_bytes(rest[8..16].try_into().unwrap_or_default());
            let max = f64::from_le_bytes(rest[16..24].try_into().unwrap_or_default());
            let decision = check_safety_cap(affected, total, max);
            if decision.is_allowed() {
                assert!(decision.note().is_none());
            }
            if affected > 0 && total == 0 {
                assert!(!decision.is_allowed());
            }
        }

        // Sub-target 2: similarity stays finite and within [-1, 1]
        _ => {
            let floats: Vec<f32> = rest
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .filter(|f| f.is_finite() && f.abs() < 1e18)
                .collect();
            let (a, b) = floats.split_at(floats.len() / 2);
            let b = &b[..a.len()];
            let similarity = cosine_similarity(a, b);
            assert!(similarity.is_finite());
            assert!((-1.0 - 1e-6..=1.0 + 1e-6).contains(&similarity));
        }
    }
});
