pub mod dream;
pub mod quota;
pub mod users;
pub mod weaver;
pub mod weaving;

pub use dream::DreamService;
pub use quota::{QuotaStatus, QuotaTracker};
pub use users::UsersService;
pub use weaver::{HttpWeaver, StoryWeaver};
pub use weaving::{WeaveResult, WeavingService};
