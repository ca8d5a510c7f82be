pub mod bank;
pub mod cfg;
pub mod chains;
pub mod session;
pub mod stats;
pub mod status;
pub mod storage;
pub mod streak;
pub mod time;
pub mod wallet;
