use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

/// An offer binding one load to one candidate driver. At most one pending
/// assignment exists per load; resolution is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub load_id: Uuid,
    pub driver_id: Uuid,
    pub vehicle_id: Option<Uuid>,
    pub trailer_id: Option<Uuid>,
    pub status: OfferStatus,
    pub offered_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

impl Assignment {
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Dispatch-facing countdown, clamped at zero once the window closed.
    pub fn expires_in_hours(&self, now: DateTime<Utc>) -> f64 {
        let remaining = (self.expires_at - now).num_seconds() as f64 / 3600.0;
        remaining.max(0.0)
    }
}

/// Wire shape for dispatch views: the assignment plus the derived countdown.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentView {
    #[serde(flatten)]
    pub assignment: Assignment,
    pub expires_in_hours: f64,
}

impl From<Assignment> for AssignmentView {
    fn from(assignment: Assignment) -> Self {
        let expires_in_hours = assignment.expires_in_hours(Utc::now());
        Self {
            assignment,
            expires_in_hours,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::{Assignment, OfferStatus};

    fn pending(expires_in: Duration) -> Assignment {
        let now = Utc::now();
        Assignment {
            id: Uuid::new_v4(),
            load_id: Uuid::new_v4(),
            driver_id: Uuid::new_v4(),
            vehicle_id: None,
            trailer_id: None,
            status: OfferStatus::Pending,
            offered_at: now,
            expires_at: now + expires_in,
            responded_at: None,
            rejection_reason: None,
        }
    }

    #[test]
    fn expiry_is_strictly_after_window() {
        let assignment = pending(Duration::hours(24));
        assert!(!assignment.is_past_expiry(assignment.expires_at));
        assert!(assignment.is_past_expiry(assignment.expires_at + Duration::seconds(1)));
    }

    #[test]
    fn countdown_clamps_at_zero() {
        let stale = pending(Duration::hours(-1));
        assert_eq!(stale.expires_in_hours(Utc::now()), 0.0);

        let fresh = pending(Duration::hours(24));
        let remaining = fresh.expires_in_hours(Utc::now());
        assert!(remaining > 23.9 && remaining <= 24.0);
    }
}
