pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod uploads;

pub use connection::{connect, connect_from_config, connect_with_settings, DbPool};
pub use repositories::{
    RepositoryError, SqlBidRepository, SqlRequisitionRepository, SqlSessionAuthenticator,
    SqlTenderRepository, SqlUserRepository,
};
pub use uploads::LocalFileStore;
