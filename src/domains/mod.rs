pub mod actions;
pub mod holding;
pub mod ledger;
