use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// One GPS fix reported by the driver's device. Accuracy is advisory
/// metadata, never a correctness gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSample {
    pub load_id: Uuid,
    pub point: GeoPoint,
    pub speed_mph: Option<f64>,
    pub heading_deg: Option<f64>,
    pub accuracy_m: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

/// Bounded per-load history plus the latest-by-timestamp pointer. Samples
/// may arrive out of temporal order; `latest` always reflects the greatest
/// timestamp seen.
#[derive(Debug, Clone, Default)]
pub struct PositionLog {
    pub samples: Vec<PositionSample>,
    pub latest: Option<PositionSample>,
}

impl PositionLog {
    /// Appends a sample, deduplicating by timestamp so a resend after a
    /// connectivity gap is a no-op. Returns false when the sample was a
    /// duplicate.
    pub fn record(&mut self, sample: PositionSample, history_limit: usize) -> bool {
        if self
            .samples
            .iter()
            .any(|s| s.recorded_at == sample.recorded_at)
        {
            return false;
        }

        let is_newest = self
            .latest
            .as_ref()
            .is_none_or(|latest| sample.recorded_at > latest.recorded_at);
        if is_newest {
            self.latest = Some(sample.clone());
        }

        self.samples.push(sample);
        if self.samples.len() > history_limit {
            let excess = self.samples.len() - history_limit;
            self.samples.drain(..excess);
        }
        true
    }
}

/// Best-effort trip estimates, not turn-by-turn routing.
#[derive(Debug, Clone, Serialize)]
pub struct RouteEstimate {
    pub traveled_km: f64,
    pub remaining_km: Option<f64>,
    pub sample_count: usize,
}
