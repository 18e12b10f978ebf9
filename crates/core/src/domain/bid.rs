use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::requisition::RequisitionItemId;
use crate::domain::tender::{TenderId, TenderSummary};
use crate::domain::user::{UserId, UserSummary};
use crate::errors::ProcurementError;
use crate::uploads::UploadedFile;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BidId(pub i64);

impl fmt::Display for BidId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BidItemId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Submitted,
    UnderReview,
    Shortlisted,
    Rejected,
    Awarded,
    Withdrawn,
}

impl BidStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::UnderReview => "under_review",
            Self::Shortlisted => "shortlisted",
            Self::Rejected => "rejected",
            Self::Awarded => "awarded",
            Self::Withdrawn => "withdrawn",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "submitted" => Some(Self::Submitted),
            "under_review" => Some(Self::UnderReview),
            "shortlisted" => Some(Self::Shortlisted),
            "rejected" => Some(Self::Rejected),
            "awarded" => Some(Self::Awarded),
            "withdrawn" => Some(Self::Withdrawn),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidItem {
    pub id: BidItemId,
    pub bid_id: BidId,
    pub requisition_item_id: Option<RequisitionItemId>,
    pub description: String,
    pub quantity: Decimal,
    pub unit: String,
    pub offered_unit_price: Decimal,
    pub specification_text: Option<String>,
    pub specification_sheet_path: Option<String>,
    pub item_image_path: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bid {
    pub id: BidId,
    pub tender_id: TenderId,
    pub supplier_id: UserId,
    pub bid_amount: Decimal,
    pub submission_date: DateTime<Utc>,
    pub technical_proposal_url: Option<String>,
    pub financial_proposal_url: Option<String>,
    pub notes: Option<String>,
    pub status: BidStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<BidItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier: Option<UserSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tender: Option<TenderSummary>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBidItem {
    #[serde(default)]
    pub requisition_item_id: Option<RequisitionItemId>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub quantity: Decimal,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub offered_unit_price: Decimal,
    #[serde(default)]
    pub specification_text: Option<String>,
}

/// A supplier's submission as received: the priced items, an optional
/// explicit total, and any files keyed by 0-based item index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewBid {
    pub items: Vec<NewBidItem>,
    pub bid_amount: Option<Decimal>,
    pub notes: Option<String>,
    pub technical_proposal_url: Option<String>,
    pub financial_proposal_url: Option<String>,
    pub spec_sheets: Vec<(usize, UploadedFile)>,
    pub images: Vec<(usize, UploadedFile)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BidItemDraft {
    pub item: NewBidItem,
    pub spec_sheet: Option<UploadedFile>,
    pub image: Option<UploadedFile>,
}

/// A validated bid ready to be written together with its items and files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BidDraft {
    pub tender_id: TenderId,
    pub supplier_id: UserId,
    pub bid_amount: Decimal,
    pub notes: Option<String>,
    pub technical_proposal_url: Option<String>,
    pub financial_proposal_url: Option<String>,
    pub items: Vec<BidItemDraft>,
}

impl NewBid {
    pub fn into_draft(
        self,
        tender_id: TenderId,
        supplier_id: UserId,
    ) -> Result<BidDraft, ProcurementError> {
        if self.items.is_empty() {
            return Err(ProcurementError::invalid_input("at least one bid item is required"));
        }
        for (index, item) in self.items.iter().enumerate() {
            validate_item(index + 1, item)?;
        }

        let bid_amount = compute_bid_amount(self.bid_amount, &self.items)?;

        let item_count = self.items.len();
        let mut items: Vec<BidItemDraft> = self
            .items
            .into_iter()
            .map(|item| BidItemDraft { item, spec_sheet: None, image: None })
            .collect();

        for (index, file) in self.spec_sheets {
            let slot = items.get_mut(index).ok_or_else(|| unknown_upload_index(index, item_count))?;
            slot.spec_sheet = Some(file);
        }
        for (index, file) in self.images {
            let slot = items.get_mut(index).ok_or_else(|| unknown_upload_index(index, item_count))?;
            slot.image = Some(file);
        }

        Ok(BidDraft {
            tender_id,
            supplier_id,
            bid_amount,
            notes: self.notes.filter(|notes| !notes.trim().is_empty()),
            technical_proposal_url: self.technical_proposal_url,
            financial_proposal_url: self.financial_proposal_url,
            items,
        })
    }
}

/// Uses the caller's total when given, otherwise sums price times quantity.
/// Either way the result must be positive.
pub fn compute_bid_amount(
    explicit: Option<Decimal>,
    items: &[NewBidItem],
) -> Result<Decimal, ProcurementError> {
    let amount = match explicit {
        Some(total) => total,
        None => items
            .iter()
            .try_fold(Decimal::ZERO, |total, item| {
                item.offered_unit_price
                    .checked_mul(item.quantity)
                    .and_then(|line| total.checked_add(line))
            })
            .ok_or_else(|| ProcurementError::invalid_input("bid amount overflows"))?,
    };

    if amount <= Decimal::ZERO {
        return Err(ProcurementError::invalid_input("bid amount must be greater than zero"));
    }
    Ok(amount)
}

fn validate_item(position: usize, item: &NewBidItem) -> Result<(), ProcurementError> {
    if item.description.trim().is_empty() {
        return Err(ProcurementError::invalid_input(format!(
            "bid item {position}: description is required"
        )));
    }
    if item.quantity <= Decimal::ZERO {
        return Err(ProcurementError::invalid_input(format!(
            "bid item {position}: quantity must be greater than zero"
        )));
    }
    if item.unit.trim().is_empty() {
        return Err(ProcurementError::invalid_input(format!(
            "bid item {position}: unit is required"
        )));
    }
    if item.offered_unit_price < Decimal::ZERO {
        return Err(ProcurementError::invalid_input(format!(
            "bid item {position}: offered_unit_price must not be negative"
        )));
    }
    Ok(())
}

fn unknown_upload_index(index: usize, item_count: usize) -> ProcurementError {
    ProcurementError::invalid_input(format!(
        "file attached to item index {index}, but the bid has {item_count} item(s)"
    ))
}
