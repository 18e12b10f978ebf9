pub mod requisitions;
pub mod tenders;

pub use requisitions::RequisitionManager;
pub use tenders::TenderManager;
