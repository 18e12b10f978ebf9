use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;
use crate::errors::ProcurementError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequisitionId(pub i64);

impl fmt::Display for RequisitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequisitionItemId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequisitionType {
    Goods,
    Services,
    FixedAsset,
}

impl RequisitionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Goods => "goods",
            Self::Services => "services",
            Self::FixedAsset => "fixed_asset",
        }
    }
}

impl FromStr for RequisitionType {
    type Err = ProcurementError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "goods" => Ok(Self::Goods),
            "services" => Ok(Self::Services),
            "fixed_asset" => Ok(Self::FixedAsset),
            "" => Err(ProcurementError::invalid_input("requisition type is required")),
            other => Err(ProcurementError::invalid_input(format!(
                "unsupported requisition type `{other}` (expected goods|services|fixed_asset)"
            ))),
        }
    }
}

/// Account assignment category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aac {
    A,
    F,
    P,
}

impl Aac {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::F => "F",
            Self::P => "P",
        }
    }
}

impl FromStr for Aac {
    type Err = ProcurementError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "A" | "a" => Ok(Self::A),
            "F" | "f" => Ok(Self::F),
            "P" | "p" => Ok(Self::P),
            other => Err(ProcurementError::invalid_input(format!(
                "unsupported aac `{other}` (expected A|F|P)"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequisitionStatus {
    #[serde(rename = "pending_approval_1")]
    PendingApproval1,
    #[serde(rename = "pending_approval_2")]
    PendingApproval2,
    Approved,
    Rejected,
    PendingTender,
    Tendered,
    Closed,
}

impl RequisitionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingApproval1 => "pending_approval_1",
            Self::PendingApproval2 => "pending_approval_2",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::PendingTender => "pending_tender",
            Self::Tendered => "tendered",
            Self::Closed => "closed",
        }
    }

    /// Decodes a stored status. `pending` and `submitted_for_approval` were
    /// written by earlier releases for requisitions awaiting a first approval.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending_approval_1" | "pending" | "submitted_for_approval" => {
                Some(Self::PendingApproval1)
            }
            "pending_approval_2" => Some(Self::PendingApproval2),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "pending_tender" => Some(Self::PendingTender),
            "tendered" => Some(Self::Tendered),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    /// A tender may only be raised against a requisition that finished its
    /// approval chain.
    pub fn accepts_tender(&self) -> bool {
        matches!(self, Self::Approved | Self::PendingTender)
    }
}

impl fmt::Display for RequisitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionItem {
    pub id: RequisitionItemId,
    pub requisition_id: RequisitionId,
    pub description: String,
    pub quantity: Decimal,
    pub unit: String,
    pub estimated_unit_price: Option<Decimal>,
    pub freight_cost: Option<Decimal>,
    pub insurance_cost: Option<Decimal>,
    pub installation_cost: Option<Decimal>,
    pub value: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requisition {
    pub id: RequisitionId,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub requisition_type: RequisitionType,
    pub aac: Option<Aac>,
    pub material_group: Option<String>,
    pub exchange_rate: Option<Decimal>,
    pub status: RequisitionStatus,
    pub approver_one_id: Option<UserId>,
    pub approved_one_at: Option<DateTime<Utc>>,
    pub approver_two_id: Option<UserId>,
    pub approved_two_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<RequisitionItem>,
}

/// Inbound create payload, before validation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequisition {
    #[serde(rename = "type", default)]
    pub requisition_type: String,
    #[serde(default)]
    pub aac: Option<String>,
    #[serde(default)]
    pub material_group: Option<String>,
    #[serde(default)]
    pub exchange_rate: Option<Decimal>,
    #[serde(default)]
    pub items: Vec<NewRequisitionItem>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequisitionItem {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub quantity: Decimal,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub estimated_unit_price: Option<Decimal>,
    #[serde(default)]
    pub freight_cost: Option<Decimal>,
    #[serde(default)]
    pub insurance_cost: Option<Decimal>,
    #[serde(default)]
    pub installation_cost: Option<Decimal>,
    #[serde(default)]
    pub value: Option<Decimal>,
}

/// A requisition that passed validation and is ready to be written together
/// with its items.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequisitionDraft {
    pub user_id: UserId,
    pub requisition_type: RequisitionType,
    pub aac: Option<Aac>,
    pub material_group: Option<String>,
    pub exchange_rate: Option<Decimal>,
    pub items: Vec<NewRequisitionItem>,
}

impl NewRequisition {
    /// Checks the payload and reports the first violation found.
    pub fn validate(self, creator: UserId) -> Result<RequisitionDraft, ProcurementError> {
        let requisition_type = self.requisition_type.parse::<RequisitionType>()?;
        let aac = match self.aac.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(value) => Some(value.parse::<Aac>()?),
        };

        if let Some(rate) = self.exchange_rate {
            if rate <= Decimal::ZERO {
                return Err(ProcurementError::invalid_input(
                    "exchange_rate must be greater than zero",
                ));
            }
        }

        if self.items.is_empty() {
            return Err(ProcurementError::invalid_input("at least one item is required"));
        }

        for (index, item) in self.items.iter().enumerate() {
            validate_item(index + 1, item)?;
        }

        Ok(RequisitionDraft {
            user_id: creator,
            requisition_type,
            aac,
            material_group: self
                .material_group
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty()),
            exchange_rate: self.exchange_rate,
            items: self.items,
        })
    }
}

fn validate_item(position: usize, item: &NewRequisitionItem) -> Result<(), ProcurementError> {
    if item.description.trim().is_empty() {
        return Err(ProcurementError::invalid_input(format!(
            "item {position}: description is required"
        )));
    }
    if item.quantity <= Decimal::ZERO {
        return Err(ProcurementError::invalid_input(format!(
            "item {position}: quantity must be greater than zero"
        )));
    }
    if item.unit.trim().is_empty() {
        return Err(ProcurementError::invalid_input(format!("item {position}: unit is required")));
    }

    let costs = [
        ("estimated_unit_price", item.estimated_unit_price),
        ("freight_cost", item.freight_cost),
        ("insurance_cost", item.insurance_cost),
        ("installation_cost", item.installation_cost),
        ("value", item.value),
    ];
    for (field, amount) in costs {
        if amount.is_some_and(|amount| amount < Decimal::ZERO) {
            return Err(ProcurementError::invalid_input(format!(
                "item {position}: {field} must not be negative"
            )));
        }
    }

    Ok(())
}
