pub mod command;
pub mod delivery;
pub mod fallback;
pub mod health;
pub mod retry;
