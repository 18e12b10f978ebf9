pub mod bid;
pub mod requisition;
pub mod tender;
pub mod user;
