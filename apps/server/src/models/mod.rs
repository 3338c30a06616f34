pub mod dream;
pub mod generation;
pub mod user;

pub use dream::{Dream, NewDream, PublicDream, UpdateDream, WeaveDreamRequest};
pub use generation::GenerationEvent;
pub use user::{CreateUserRequest, LoginRequest, UpdateProfileRequest, User};
