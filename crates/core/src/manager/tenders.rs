use chrono::Utc;
use tracing::{info, warn};

use crate::access::{self, Action};
use crate::domain::bid::{Bid, NewBid};
use crate::domain::tender::{NewTender, Tender, TenderDetail, TenderId, TenderPatch};
use crate::errors::ProcurementError;
use crate::identity::Actor;
use crate::repository::{BidRepository, TenderRepository};
use crate::uploads::FileStore;

pub struct TenderManager<T, B, F> {
    tenders: T,
    bids: B,
    files: F,
}

impl<T, B, F> TenderManager<T, B, F>
where
    T: TenderRepository,
    B: BidRepository,
    F: FileStore,
{
    pub fn new(tenders: T, bids: B, files: F) -> Self {
        Self { tenders, bids, files }
    }

    pub async fn create_tender(
        &self,
        payload: NewTender,
        actor: &Actor,
    ) -> Result<Tender, ProcurementError> {
        access::require(actor.role, Action::CreateTender)?;
        let payload = payload.validate()?;

        let tender = self.tenders.create(payload, actor.user_id, Utc::now()).await?;
        info!(
            event_name = "tender.created",
            tender_id = tender.id.0,
            requisition_id = tender.requisition_id.map(|id| id.0),
            user_id = actor.user_id.0,
            "tender created"
        );
        Ok(tender)
    }

    pub async fn update_tender(
        &self,
        id: TenderId,
        patch: TenderPatch,
        actor: &Actor,
    ) -> Result<Tender, ProcurementError> {
        access::require(actor.role, Action::UpdateTender)?;

        let tender = self.tenders.update(id, patch, Utc::now()).await?;
        info!(
            event_name = "tender.updated",
            tender_id = tender.id.0,
            status = tender.status.as_str(),
            user_id = actor.user_id.0,
            "tender updated"
        );
        Ok(tender)
    }

    pub async fn get_tender(
        &self,
        id: TenderId,
        _actor: &Actor,
    ) -> Result<TenderDetail, ProcurementError> {
        self.tenders.find_detail(id).await?.ok_or_else(|| ProcurementError::not_found("tender", id))
    }

    /// Suppliers browse open tenders, officers and admins see everything, and
    /// other roles see the tenders they created.
    pub async fn list_tenders(
        &self,
        actor: &Actor,
        category: Option<&str>,
    ) -> Result<Vec<Tender>, ProcurementError> {
        if access::allow(actor.role, Action::BrowseOpenTenders) {
            let category = category.map(str::trim).filter(|value| !value.is_empty());
            self.tenders.list_open(Utc::now(), category).await
        } else if access::allow(actor.role, Action::ViewAllTenders) {
            self.tenders.list_all().await
        } else {
            self.tenders.list_created_by(actor.user_id).await
        }
    }

    pub async fn create_bid(
        &self,
        tender_id: TenderId,
        actor: &Actor,
        payload: NewBid,
    ) -> Result<Bid, ProcurementError> {
        access::require(actor.role, Action::SubmitBid)?;

        let tender = self
            .tenders
            .find_by_id(tender_id)
            .await?
            .ok_or_else(|| ProcurementError::not_found("tender", tender_id))?;
        let now = Utc::now();
        tender.ensure_accepting_bids(now)?;

        let draft = payload.into_draft(tender_id, actor.user_id)?;
        let bid = self.bids.create_with_items(draft, &self.files, now).await?;
        info!(
            event_name = "bid.created",
            bid_id = bid.id.0,
            tender_id = tender_id.0,
            user_id = actor.user_id.0,
            bid_amount = %bid.bid_amount,
            "bid submitted"
        );

        match self.bids.find_with_items(bid.id).await {
            Ok(Some(full)) => Ok(full),
            Ok(None) => {
                warn!(
                    event_name = "bid.readback_missing",
                    bid_id = bid.id.0,
                    "committed bid was not found on read-back; returning header only"
                );
                Ok(bid)
            }
            Err(error) => {
                warn!(
                    event_name = "bid.readback_failed",
                    bid_id = bid.id.0,
                    error = %error,
                    "committed bid could not be re-read; returning header only"
                );
                Ok(bid)
            }
        }
    }

    pub async fn list_tender_bids(
        &self,
        tender_id: TenderId,
        actor: &Actor,
    ) -> Result<Vec<Bid>, ProcurementError> {
        access::require(actor.role, Action::ReviewTenderBids)?;

        if self.tenders.find_by_id(tender_id).await?.is_none() {
            return Err(ProcurementError::not_found("tender", tender_id));
        }
        self.bids.list_for_tender(tender_id).await
    }

    pub async fn list_my_bids(&self, actor: &Actor) -> Result<Vec<Bid>, ProcurementError> {
        access::require(actor.role, Action::ListOwnBids)?;
        self.bids.list_for_supplier(actor.user_id).await
    }
}
