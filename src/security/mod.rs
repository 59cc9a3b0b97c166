pub mod auth;
pub mod jwt;

pub use auth::{AuthError, AuthUser};
pub use jwt::{Claims, JwtConfig, JwtManager, ADMIN_ROLE};
