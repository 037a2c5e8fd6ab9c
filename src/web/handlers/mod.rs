pub mod health;
pub mod slack;
