pub mod auth;
pub mod dreams;
pub mod health;
pub mod quota;
