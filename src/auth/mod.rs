pub mod authentication;
pub mod credentials;
pub mod last_admin;
pub mod permissions;
pub mod session;
pub mod user;

pub use authentication::*;
pub use credentials::*;
pub use last_admin::*;
pub use permissions::*;
pub use session::*;
pub use user::*;
