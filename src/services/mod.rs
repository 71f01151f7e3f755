//! Business logic services

pub mod auth;
pub mod borrows;
pub mod catalog;
pub mod overdue;

use crate::{
    config::{AuthConfig, LoansConfig},
    repository::Repository,
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub auth: auth::AuthService,
    pub catalog: catalog::CatalogService,
    pub borrows: borrows::BorrowsService,
    pub repository: Repository,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, auth_config: AuthConfig, loans_config: LoansConfig) -> Self {
        Self {
            auth: auth::AuthService::new(repository.clone(), auth_config),
            catalog: catalog::CatalogService::new(repository.clone()),
            borrows: borrows::BorrowsService::new(repository.clone(), loans_config),
            repository,
        }
    }

    /// Background job flagging overdue borrows
    pub fn overdue_sweeper(&self, loans_config: &LoansConfig) -> overdue::OverdueSweeper {
        overdue::OverdueSweeper::new(
            self.repository.clone(),
            std::time::Duration::from_secs(loans_config.overdue_sweep_interval_secs),
        )
    }
}
