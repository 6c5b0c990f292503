pub mod authorization;
pub mod expiry;
