mod jwt;
mod middleware;
mod password;

pub use jwt::{Claims, IssuedToken, JwtKeys};
pub use middleware::{reject_anonymous_users, AuthenticatedUser, UserId};
pub use password::{
    change_password, compute_password_hash, validate_credentials, AuthError, Credentials,
};
