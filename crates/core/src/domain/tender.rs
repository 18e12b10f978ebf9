use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::requisition::{Requisition, RequisitionId};
use crate::domain::user::UserId;
use crate::errors::ProcurementError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenderId(pub i64);

impl fmt::Display for TenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenderStatus {
    Draft,
    Published,
    Evaluation,
    Awarded,
    Cancelled,
}

impl TenderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Evaluation => "evaluation",
            Self::Awarded => "awarded",
            Self::Cancelled => "cancelled",
        }
    }

    /// Case-insensitive decode; `open` is an older spelling of `published`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "published" | "open" => Some(Self::Published),
            "evaluation" => Some(Self::Evaluation),
            "awarded" => Some(Self::Awarded),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for TenderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tender {
    pub id: TenderId,
    pub requisition_id: Option<RequisitionId>,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub budget: Option<Decimal>,
    pub status: TenderStatus,
    pub published_date: Option<DateTime<Utc>>,
    pub closing_date: Option<DateTime<Utc>>,
    pub evaluation_method: Option<String>,
    pub bid_opening_date: Option<DateTime<Utc>>,
    pub created_by_user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tender {
    /// Bids are accepted only while the tender is published and its closing
    /// date lies strictly in the future.
    pub fn ensure_accepting_bids(&self, now: DateTime<Utc>) -> Result<(), ProcurementError> {
        if self.status != TenderStatus::Published {
            return Err(ProcurementError::invalid_state(format!(
                "tender {} is not open for bidding (status {})",
                self.id, self.status
            )));
        }

        match self.closing_date {
            None => Err(ProcurementError::invalid_state(format!(
                "tender {} has no closing date",
                self.id
            ))),
            Some(closing) if closing <= now => Err(ProcurementError::invalid_state(format!(
                "tender {} closed at {}",
                self.id,
                closing.to_rfc3339()
            ))),
            Some(_) => Ok(()),
        }
    }

    pub fn apply_patch(&mut self, patch: TenderPatch) -> Result<(), ProcurementError> {
        if let Some(title) = patch.title {
            let title = title.trim();
            if title.is_empty() {
                return Err(ProcurementError::invalid_input("title must not be blank"));
            }
            self.title = title.to_owned();
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
        }
        if let Some(category) = patch.category {
            self.category = Some(category);
        }
        if let Some(budget) = patch.budget {
            ensure_budget(budget)?;
            self.budget = Some(budget);
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(published_date) = patch.published_date {
            self.published_date = Some(published_date);
        }
        if let Some(closing_date) = patch.closing_date {
            self.closing_date = Some(closing_date);
        }
        if let Some(evaluation_method) = patch.evaluation_method {
            self.evaluation_method = Some(evaluation_method);
        }
        if let Some(bid_opening_date) = patch.bid_opening_date {
            self.bid_opening_date = Some(bid_opening_date);
        }

        ensure_window(self.published_date, self.closing_date)
    }
}

/// A tender together with the requisition it was raised from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenderDetail {
    #[serde(flatten)]
    pub tender: Tender,
    pub requisition: Option<Requisition>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenderSummary {
    pub id: TenderId,
    pub title: String,
    pub status: TenderStatus,
    pub closing_date: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTender {
    #[serde(default)]
    pub requisition_id: Option<RequisitionId>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub budget: Option<Decimal>,
    #[serde(default)]
    pub status: Option<TenderStatus>,
    #[serde(default)]
    pub published_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub closing_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub evaluation_method: Option<String>,
    #[serde(default)]
    pub bid_opening_date: Option<DateTime<Utc>>,
}

impl NewTender {
    pub fn validate(mut self) -> Result<Self, ProcurementError> {
        self.title = self.title.trim().to_owned();
        if self.title.is_empty() {
            return Err(ProcurementError::invalid_input("title is required"));
        }
        if let Some(budget) = self.budget {
            ensure_budget(budget)?;
        }
        ensure_window(self.published_date, self.closing_date)?;
        Ok(self)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenderPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub budget: Option<Decimal>,
    #[serde(default)]
    pub status: Option<TenderStatus>,
    #[serde(default)]
    pub published_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub closing_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub evaluation_method: Option<String>,
    #[serde(default)]
    pub bid_opening_date: Option<DateTime<Utc>>,
}

fn ensure_budget(budget: Decimal) -> Result<(), ProcurementError> {
    if budget < Decimal::ZERO {
        return Err(ProcurementError::invalid_input("budget must not be negative"));
    }
    Ok(())
}

fn ensure_window(
    published: Option<DateTime<Utc>>,
    closing: Option<DateTime<Utc>>,
) -> Result<(), ProcurementError> {
    if let (Some(published), Some(closing)) = (published, closing) {
        if closing <= published {
            return Err(ProcurementError::invalid_input(
                "closing_date must be after published_date",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{NewTender, Tender, TenderId, TenderPatch, TenderStatus};

    fn tender(status: TenderStatus, closing_in: Option<Duration>) -> Tender {
        let now = Utc::now();
        Tender {
            id: TenderId(3),
            requisition_id: None,
            title: "Office laptops".to_string(),
            description: None,
            category: Some("IT".to_string()),
            budget: None,
            status,
            published_date: Some(now - Duration::days(1)),
            closing_date: closing_in.map(|offset| now + offset),
            evaluation_method: None,
            bid_opening_date: None,
            created_by_user_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn published_tender_with_future_closing_accepts_bids() {
        let open = tender(TenderStatus::Published, Some(Duration::days(2)));
        assert!(open.ensure_accepting_bids(Utc::now()).is_ok());
    }

    #[test]
    fn closed_or_unpublished_tender_rejects_bids() {
        let past = tender(TenderStatus::Published, Some(Duration::hours(-1)));
        let error = past.ensure_accepting_bids(Utc::now()).expect_err("closed");
        assert_eq!(error.kind().as_str(), "invalid_state");

        let undated = tender(TenderStatus::Published, None);
        assert!(undated.ensure_accepting_bids(Utc::now()).is_err());

        let draft = tender(TenderStatus::Draft, Some(Duration::days(2)));
        let error = draft.ensure_accepting_bids(Utc::now()).expect_err("draft");
        assert!(error.to_string().contains("status draft"));
    }

    #[test]
    fn status_decoding_is_case_insensitive() {
        assert_eq!(TenderStatus::parse("PUBLISHED"), Some(TenderStatus::Published));
        assert_eq!(TenderStatus::parse("open"), Some(TenderStatus::Published));
        assert_eq!(TenderStatus::parse("unknown"), None);
    }

    #[test]
    fn new_tender_requires_title_and_ordered_window() {
        let error = NewTender::default().validate().expect_err("title");
        assert!(error.to_string().contains("title is required"));

        let now = Utc::now();
        let inverted = NewTender {
            title: "Generators".to_string(),
            published_date: Some(now),
            closing_date: Some(now - Duration::days(1)),
            ..NewTender::default()
        };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn patch_updates_only_supplied_fields() {
        let mut current = tender(TenderStatus::Draft, Some(Duration::days(5)));
        current
            .apply_patch(TenderPatch {
                status: Some(TenderStatus::Published),
                evaluation_method: Some("lowest_price".to_string()),
                ..TenderPatch::default()
            })
            .expect("patch");

        assert_eq!(current.status, TenderStatus::Published);
        assert_eq!(current.title, "Office laptops");
        assert_eq!(current.evaluation_method.as_deref(), Some("lowest_price"));

        let error = current
            .apply_patch(TenderPatch { title: Some(" ".to_string()), ..TenderPatch::default() })
            .expect_err("blank title");
        assert_eq!(error.kind().as_str(), "invalid_input");
    }
}
