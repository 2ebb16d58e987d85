//! Safety cap on automated deletion.

/// Note carried by a report when a kind's cleanup was withheld.
pub const SAFETY_SKIP_NOTE: &str = "cleanup skipped: exceeds safety threshold";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SafetyDecision {
    Allowed,
    Exceeded {
        affected: u64,
        total: u64,
        percentage: f64,
        max_percentage: f64,
    },
}

impl SafetyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Human-readable note for the report, `None` when allowed.
    pub fn note(&self) -> Option<String> {
        match self {
            Self::Allowed => None,
            Self::Exceeded {
                affected,
                total,
                percentage,
                max_percentage,
            } => Some(format!(
                "{SAFETY_SKIP_NOTE} ({affected} of {total} = {percentage:.2}% > {max_percentage:.2}%)"
            )),
        }
    }
}

/// Decide whether deleting `affected` of `total` records stays within
/// `max_percentage`. Exactly at the cap is allowed. Any deletion against an
/// empty inventory exceeds it.
#[allow(clippy::cast_precision_loss)]
pub fn check_safety_cap(affected: u64, total: u64, max_percentage: f64) -> SafetyDecision {
    if affected == 0 {
        return SafetyDecision::Allowed;
    }
    let percentage = if total == 0 {
        100.0
    } else {
        affected as f64 / total as f64 * 100.0
    };
    // Compared as products to keep whole-number caps exact.
    let exceeds = total == 0 || (affected as f64) * 100.0 > max_percentage * total as f64;
    if exceeds {
        SafetyDecision::Exceeded {
            affected,
            total,
            percentage,
            max_percentage,
        }
    } else {
        SafetyDecision::Allowed
    }
}
