pub mod clock;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod jobs;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod tenant;
pub mod wal;
