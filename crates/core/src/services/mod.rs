pub mod admin_service;
pub mod investment_service;
pub mod ledger_service;
pub mod scheduler;
pub mod sync_service;
