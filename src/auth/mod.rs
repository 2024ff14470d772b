pub mod middleware;
pub mod role;
pub mod token;

pub use middleware::{AdminAuth, AuthContext, UserAuth};
pub use role::Role;
