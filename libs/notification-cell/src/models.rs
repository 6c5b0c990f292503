use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientKind {
    Patient,
    Doctor,
}

/// Lifecycle events the dispatcher turns into in-app and email notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    BookingCreated,
    BookingCancelled,
    BookingReprogrammed,
    StatusChanged,
    AuthorizationIssued,
    AuthorizationAssigned,
    AuthorizationExpiringSoon,
    Reminder24h,
    Reminder2h,
}

impl fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationCategory::BookingCreated => write!(f, "booking_created"),
            NotificationCategory::BookingCancelled => write!(f, "booking_cancelled"),
            NotificationCategory::BookingReprogrammed => write!(f, "booking_reprogrammed"),
            NotificationCategory::StatusChanged => write!(f, "status_changed"),
            NotificationCategory::AuthorizationIssued => write!(f, "authorization_issued"),
            NotificationCategory::AuthorizationAssigned => write!(f, "authorization_assigned"),
            NotificationCategory::AuthorizationExpiringSoon => {
                write!(f, "authorization_expiring_soon")
            }
            NotificationCategory::Reminder24h => write!(f, "reminder_24h"),
            NotificationCategory::Reminder2h => write!(f, "reminder_2h"),
        }
    }
}

/// Fully-formed payload handed to the external dispatcher. The engine never
/// renders email HTML; it ships recipient, category and text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub recipient_kind: RecipientKind,
    pub recipient_id: Uuid,
    pub category: NotificationCategory,
    pub title: String,
    pub body: String,
    pub related_booking_id: Option<Uuid>,
    pub related_authorization_id: Option<Uuid>,
}

impl NotificationEvent {
    pub fn for_patient(
        recipient_id: Uuid,
        category: NotificationCategory,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            recipient_kind: RecipientKind::Patient,
            recipient_id,
            category,
            title: title.into(),
            body: body.into(),
            related_booking_id: None,
            related_authorization_id: None,
        }
    }

    pub fn for_doctor(
        recipient_id: Uuid,
        category: NotificationCategory,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            recipient_kind: RecipientKind::Doctor,
            recipient_id,
            category,
            title: title.into(),
            body: body.into(),
            related_booking_id: None,
            related_authorization_id: None,
        }
    }

    pub fn about_booking(mut self, booking_id: Uuid) -> Self {
        self.related_booking_id = Some(booking_id);
        self
    }

    pub fn about_authorization(mut self, authorization_id: Uuid) -> Self {
        self.related_authorization_id = Some(authorization_id);
        self
    }
}
