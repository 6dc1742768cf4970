//! Marketplace-specific site implementations

pub mod steam;

pub use steam::SteamMarket;
