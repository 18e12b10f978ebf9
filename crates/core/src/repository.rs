//! Storage contracts the managers are written against.
//!
//! Aggregate writes (a requisition with its items, a bid with its items and
//! files) are single methods so an implementation can run each one inside one
//! transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::approvals::Decision;
use crate::domain::bid::{Bid, BidDraft, BidId};
use crate::domain::requisition::{Requisition, RequisitionDraft, RequisitionId};
use crate::domain::tender::{NewTender, Tender, TenderDetail, TenderId, TenderPatch};
use crate::domain::user::{NewUser, User, UserId};
use crate::errors::ProcurementError;
use crate::uploads::FileStore;

#[async_trait]
pub trait RequisitionRepository: Send + Sync {
    /// Inserts the parent row, then each item against the generated id. Nothing
    /// is persisted unless every row is.
    async fn create_with_items(
        &self,
        draft: RequisitionDraft,
        now: DateTime<Utc>,
    ) -> Result<Requisition, ProcurementError>;

    async fn find_by_id(&self, id: RequisitionId)
        -> Result<Option<Requisition>, ProcurementError>;

    async fn find_owned(
        &self,
        id: RequisitionId,
        owner: UserId,
    ) -> Result<Option<Requisition>, ProcurementError>;

    /// Newest first, items included.
    async fn list_all(&self) -> Result<Vec<Requisition>, ProcurementError>;

    async fn list_for_owner(&self, owner: UserId) -> Result<Vec<Requisition>, ProcurementError>;

    /// Loads the requisition under a write lock, runs the approval state
    /// machine and writes the result back in the same transaction. Returns the
    /// updated requisition without items.
    async fn apply_decision(
        &self,
        id: RequisitionId,
        actor: UserId,
        decision: &Decision,
        now: DateTime<Utc>,
    ) -> Result<Requisition, ProcurementError>;
}

#[async_trait]
pub trait TenderRepository: Send + Sync {
    /// Persists a tender. When it references a requisition, that requisition
    /// must be approved and untendered, and is marked tendered in the same
    /// transaction.
    async fn create(
        &self,
        tender: NewTender,
        created_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<Tender, ProcurementError>;

    async fn find_by_id(&self, id: TenderId) -> Result<Option<Tender>, ProcurementError>;

    /// The tender plus its originating requisition and that requisition's items.
    async fn find_detail(&self, id: TenderId) -> Result<Option<TenderDetail>, ProcurementError>;

    async fn list_all(&self) -> Result<Vec<Tender>, ProcurementError>;

    /// Published tenders still accepting bids at `now`, optionally narrowed to
    /// a category compared without regard to case.
    async fn list_open(
        &self,
        now: DateTime<Utc>,
        category: Option<&str>,
    ) -> Result<Vec<Tender>, ProcurementError>;

    async fn list_created_by(&self, creator: UserId) -> Result<Vec<Tender>, ProcurementError>;

    async fn update(
        &self,
        id: TenderId,
        patch: TenderPatch,
        now: DateTime<Utc>,
    ) -> Result<Tender, ProcurementError>;
}

#[async_trait]
pub trait BidRepository: Send + Sync {
    /// Inserts the bid, stores each item's files through `files`, then inserts
    /// the item rows. On failure the transaction rolls back and files written
    /// so far are removed where possible. Returns the committed bid header.
    async fn create_with_items(
        &self,
        draft: BidDraft,
        files: &dyn FileStore,
        now: DateTime<Utc>,
    ) -> Result<Bid, ProcurementError>;

    async fn find_with_items(&self, id: BidId) -> Result<Option<Bid>, ProcurementError>;

    /// Oldest submission first, each bid with items and supplier identity.
    async fn list_for_tender(&self, tender_id: TenderId) -> Result<Vec<Bid>, ProcurementError>;

    /// Newest submission first, each bid with items and tender identity.
    async fn list_for_supplier(&self, supplier_id: UserId) -> Result<Vec<Bid>, ProcurementError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: NewUser, now: DateTime<Utc>) -> Result<User, ProcurementError>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, ProcurementError>;

    /// Deactivated users keep their records but can no longer authenticate.
    async fn set_active(&self, id: UserId, active: bool) -> Result<(), ProcurementError>;
}
