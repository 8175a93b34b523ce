use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::position::GeoPoint;

/// One checkpoint in a load's trip. Forward progress walks the variants in
/// declaration order; `Delivered` is a terminal synonym reachable only from
/// `ReceiverOffload`, and `Cancelled` is reachable from any non-terminal
/// stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Created,
    Assigned,
    TripAccepted,
    TripStarted,
    ShipperCheckIn,
    ShipperLoadIn,
    ShipperLoadOut,
    InTransit,
    ReceiverCheckIn,
    ReceiverOffload,
    Completed,
    Delivered,
    Cancelled,
}

impl Stage {
    /// Position in the canonical forward order. `Delivered` shares the
    /// ordinal of `Completed`; `Cancelled` sits outside the order.
    pub fn ordinal(&self) -> u8 {
        match self {
            Stage::Created => 0,
            Stage::Assigned => 1,
            Stage::TripAccepted => 2,
            Stage::TripStarted => 3,
            Stage::ShipperCheckIn => 4,
            Stage::ShipperLoadIn => 5,
            Stage::ShipperLoadOut => 6,
            Stage::InTransit => 7,
            Stage::ReceiverCheckIn => 8,
            Stage::ReceiverOffload => 9,
            Stage::Completed | Stage::Delivered => 10,
            Stage::Cancelled => 11,
        }
    }

    pub fn successor(&self) -> Option<Stage> {
        match self {
            Stage::Created => Some(Stage::Assigned),
            Stage::Assigned => Some(Stage::TripAccepted),
            Stage::TripAccepted => Some(Stage::TripStarted),
            Stage::TripStarted => Some(Stage::ShipperCheckIn),
            Stage::ShipperCheckIn => Some(Stage::ShipperLoadIn),
            Stage::ShipperLoadIn => Some(Stage::ShipperLoadOut),
            Stage::ShipperLoadOut => Some(Stage::InTransit),
            Stage::InTransit => Some(Stage::ReceiverCheckIn),
            Stage::ReceiverCheckIn => Some(Stage::ReceiverOffload),
            Stage::ReceiverOffload => Some(Stage::Completed),
            Stage::Completed | Stage::Delivered | Stage::Cancelled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Delivered | Stage::Cancelled)
    }

    /// Stages during which the driver is on the road and position samples
    /// are accepted.
    pub fn is_en_route(&self) -> bool {
        (Stage::TripStarted.ordinal()..=Stage::ReceiverOffload.ordinal())
            .contains(&self.ordinal())
            && !matches!(self, Stage::Cancelled)
    }

    /// Single-step advancement, plus the `Delivered` alias from
    /// `ReceiverOffload` and `Cancelled` from any non-terminal stage.
    pub fn can_advance_to(&self, target: Stage) -> bool {
        if target == Stage::Cancelled {
            return !self.is_terminal();
        }
        if target == Stage::Delivered {
            return *self == Stage::ReceiverOffload;
        }
        self.successor() == Some(target)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub address: String,
    pub point: Option<GeoPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEntry {
    pub stage: Stage,
    pub at: DateTime<Utc>,
    pub point: Option<GeoPoint>,
    pub note: Option<String>,
}

/// Stage-specific artifacts the driver must supply when advancing. The
/// variant is keyed to the target stage so a missing or mismatched artifact
/// is checkable before the transition is applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StagePayload {
    TripStart {
        odometer_miles: f64,
        odometer_photo_url: String,
    },
    LoadIn {
        po_number: String,
        #[serde(default)]
        reference_numbers: Vec<String>,
    },
    LoadOut {
        bill_of_lading_url: String,
    },
    Offload {
        proof_of_delivery_url: String,
    },
}

/// Financial fields are carried opaquely for the surrounding product.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Financials {
    pub rate: Option<f64>,
    pub advance: Option<f64>,
    pub balance: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Load {
    pub id: Uuid,
    pub origin: Location,
    pub destination: Location,
    pub pickup_at: Option<DateTime<Utc>>,
    pub delivery_at: Option<DateTime<Utc>>,
    pub driver_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub trailer_id: Option<Uuid>,
    pub stage: Stage,
    pub status_history: Vec<StatusEntry>,
    #[serde(default)]
    pub financials: Financials,
    pub odometer_start_miles: Option<f64>,
    pub odometer_photo_url: Option<String>,
    pub po_number: Option<String>,
    pub reference_numbers: Vec<String>,
    pub bill_of_lading_url: Option<String>,
    pub proof_of_delivery_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Load {
    pub fn new(
        origin: Location,
        destination: Location,
        pickup_at: Option<DateTime<Utc>>,
        delivery_at: Option<DateTime<Utc>>,
        financials: Financials,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            origin,
            destination,
            pickup_at,
            delivery_at,
            driver_id: None,
            vehicle_id: None,
            trailer_id: None,
            stage: Stage::Created,
            status_history: vec![StatusEntry {
                stage: Stage::Created,
                at: now,
                point: None,
                note: None,
            }],
            financials,
            odometer_start_miles: None,
            odometer_photo_url: None,
            po_number: None,
            reference_numbers: Vec::new(),
            bill_of_lading_url: None,
            proof_of_delivery_url: None,
            created_at: now,
        }
    }
}
