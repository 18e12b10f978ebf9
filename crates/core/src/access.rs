use crate::domain::user::Role;
use crate::errors::ProcurementError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    CreateRequisition,
    ViewAllRequisitions,
    DecideRequisition,
    CreateTender,
    UpdateTender,
    ViewAllTenders,
    BrowseOpenTenders,
    SubmitBid,
    ReviewTenderBids,
    ListOwnBids,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateRequisition => "create_requisition",
            Self::ViewAllRequisitions => "view_all_requisitions",
            Self::DecideRequisition => "decide_requisition",
            Self::CreateTender => "create_tender",
            Self::UpdateTender => "update_tender",
            Self::ViewAllTenders => "view_all_tenders",
            Self::BrowseOpenTenders => "browse_open_tenders",
            Self::SubmitBid => "submit_bid",
            Self::ReviewTenderBids => "review_tender_bids",
            Self::ListOwnBids => "list_own_bids",
        }
    }
}

/// Every action names its own allowed roles; there is no role hierarchy.
pub fn allow(role: Role, action: Action) -> bool {
    use Role::*;

    match action {
        Action::CreateRequisition => matches!(role, Requester | ProcurementOfficer | Admin),
        Action::ViewAllRequisitions => matches!(role, ProcurementOfficer | Admin),
        Action::DecideRequisition => matches!(role, Admin | Approver),
        Action::CreateTender | Action::UpdateTender | Action::ViewAllTenders => {
            matches!(role, ProcurementOfficer | Admin)
        }
        Action::BrowseOpenTenders | Action::SubmitBid | Action::ListOwnBids => role == Supplier,
        Action::ReviewTenderBids => role == ProcurementOfficer,
    }
}

pub fn require(role: Role, action: Action) -> Result<(), ProcurementError> {
    if allow(role, action) {
        Ok(())
    } else {
        Err(ProcurementError::forbidden(format!(
            "role `{}` may not {}",
            role.as_str(),
            action.as_str().replace('_', " ")
        )))
    }
}
