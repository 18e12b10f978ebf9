//! Dual-approval state machine for requisitions.
//!
//! A requisition moves `pending_approval_1 -> pending_approval_2 -> approved`,
//! one approver per step, and the two approvers must be different people.
//! Rejection is possible from every status that has not yet been approved or
//! moved into tendering. The functions here are pure; persistence wraps them in
//! a transaction that holds the row's write lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::requisition::{Requisition, RequisitionStatus};
use crate::domain::user::UserId;
use crate::errors::ProcurementError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject { reason: String },
}

impl Decision {
    /// Parses the caller's action and checks the rejection reason. Runs before
    /// the requisition is loaded, so a blank reason is always `InvalidInput`
    /// whatever state the requisition is in.
    pub fn parse(action: &str, reason: Option<&str>) -> Result<Self, ProcurementError> {
        match action.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(Self::Approve),
            "reject" => {
                let reason = reason.map(str::trim).unwrap_or_default();
                if reason.is_empty() {
                    return Err(ProcurementError::invalid_input(
                        "a reason is required to reject a requisition",
                    ));
                }
                Ok(Self::Reject { reason: reason.to_owned() })
            }
            other => Err(ProcurementError::invalid_input(format!(
                "unsupported action `{other}` (expected approve|reject)"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject { .. } => "reject",
        }
    }
}

/// Applies `decision` by `actor` to `requisition` in place.
///
/// Prior approval evidence is kept when a requisition is rejected.
pub fn apply(
    requisition: &mut Requisition,
    actor: UserId,
    decision: &Decision,
    now: DateTime<Utc>,
) -> Result<(), ProcurementError> {
    match decision {
        Decision::Approve => approve(requisition, actor, now)?,
        Decision::Reject { reason } => reject(requisition, reason)?,
    }
    requisition.updated_at = now;
    Ok(())
}

fn approve(
    requisition: &mut Requisition,
    actor: UserId,
    now: DateTime<Utc>,
) -> Result<(), ProcurementError> {
    match requisition.status {
        RequisitionStatus::PendingApproval1 => {
            requisition.approver_one_id = Some(actor);
            requisition.approved_one_at = Some(now);
            requisition.status = RequisitionStatus::PendingApproval2;
            Ok(())
        }
        RequisitionStatus::PendingApproval2 => {
            if requisition.approver_one_id == Some(actor) {
                return Err(ProcurementError::forbidden(
                    "second approval must be by a different approver",
                ));
            }
            requisition.approver_two_id = Some(actor);
            requisition.approved_two_at = Some(now);
            requisition.status = RequisitionStatus::Approved;
            Ok(())
        }
        other => Err(ProcurementError::invalid_state(format!(
            "cannot approve requisition in status {other}"
        ))),
    }
}

fn reject(requisition: &mut Requisition, reason: &str) -> Result<(), ProcurementError> {
    match requisition.status {
        RequisitionStatus::Approved | RequisitionStatus::Tendered | RequisitionStatus::Closed => {
            Err(ProcurementError::invalid_state(format!(
                "cannot reject requisition in status {}",
                requisition.status
            )))
        }
        _ => {
            requisition.status = RequisitionStatus::Rejected;
            requisition.rejection_reason = Some(reason.to_owned());
            Ok(())
        }
    }
}
