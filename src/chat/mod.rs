pub mod messages;
pub mod pipeline;
pub mod presence;
pub mod router;
pub mod users;
