pub mod check;
pub mod config;
pub mod diff;
pub mod fetcher;
pub mod fingerprint;
pub mod jobs;
pub mod model;
pub mod normalizer;
pub mod price;
pub mod screenshot;
pub mod storage;
pub mod summary;
pub mod views;

pub use check::{ChainState, CheckRunner};
pub use jobs::CheckQueue;
pub use model::CheckOutcome;
pub use storage::SqliteStorage;
