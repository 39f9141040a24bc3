pub mod movie;
pub mod permission;
pub mod user;

pub use movie::{Movie, Runtime};
pub use permission::Permissions;
pub use user::User;
