pub mod channel;
pub mod database;
pub mod fallback;
pub mod health;
pub mod rbmq;
