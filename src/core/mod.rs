//! Core domain types and abstractions

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod fund;
pub mod log;
pub mod market;
pub mod quote;

// Re-export main types for cleaner imports
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::FundNavError;
pub use fund::{FundDataProvider, FundProfile, Holding, NavHistoryProvider, NavRecord};
pub use market::MarketSession;
pub use quote::{Quote, QuoteProvider};
