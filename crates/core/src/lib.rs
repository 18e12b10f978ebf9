pub mod access;
pub mod approvals;
pub mod config;
pub mod domain;
pub mod errors;
pub mod identity;
pub mod manager;
pub mod repository;
pub mod uploads;

pub use access::Action;
pub use approvals::Decision;
pub use domain::bid::{Bid, BidId, BidItem, BidStatus, NewBid, NewBidItem};
pub use domain::requisition::{
    NewRequisition, NewRequisitionItem, Requisition, RequisitionId, RequisitionItem,
    RequisitionStatus, RequisitionType,
};
pub use domain::tender::{NewTender, Tender, TenderDetail, TenderId, TenderPatch, TenderStatus};
pub use domain::user::{Role, User, UserId};
pub use errors::{ErrorKind, InterfaceError, ProcurementError};
pub use identity::{Actor, Authenticator};
pub use manager::{RequisitionManager, TenderManager};
pub use uploads::{FileStore, FileStoreError, UploadKind, UploadedFile};
