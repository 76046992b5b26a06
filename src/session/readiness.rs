//! Bar-data readiness gate

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Readiness of historical bar data for one strategy/symbol pair
///
/// Recomputed fresh every evaluation tick; a cached copy would mask bars
/// that arrived since.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolReadiness {
    pub all_ready: bool,
    /// (available, required) per timeframe label
    pub per_timeframe: BTreeMap<String, (usize, usize)>,
    /// Display line, e.g. "15s: 9/10, 1m: 25/20 (Waiting...)"
    pub status: String,
}

/// Compare required bar counts against what the broker currently holds.
///
/// Advisory only: a not-ready result blocks trade initiation, never
/// market-data polling.
pub fn check_readiness(
    required: &BTreeMap<String, usize>,
    available: &BTreeMap<String, usize>,
) -> SymbolReadiness {
    let mut all_ready = true;
    let mut per_timeframe = BTreeMap::new();
    let mut parts = Vec::new();

    if required.is_empty() {
        parts.push("No specific bar data required.".to_string());
    } else {
        for (timeframe, &required_count) in required {
            let available_count = available.get(timeframe).copied().unwrap_or(0);
            parts.push(format!(
                "{}: {}/{}",
                timeframe, available_count, required_count
            ));
            if available_count < required_count {
                all_ready = false;
            }
            per_timeframe.insert(timeframe.clone(), (available_count, required_count));
        }
    }

    let mut status = parts.join(", ");
    status.push_str(if all_ready { " (Ready)" } else { " (Waiting...)" });

    SymbolReadiness {
        all_ready,
        per_timeframe,
        status,
    }
}
