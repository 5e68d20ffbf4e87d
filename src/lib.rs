pub mod api;
pub mod calendar;
pub mod config;
pub mod directory;
pub mod engine;
pub mod lifecycle;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod pricing;
pub mod reaper;
pub mod wal;
