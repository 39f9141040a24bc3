pub mod identity;
pub mod password;
pub mod token;

pub use identity::Identity;
pub use password::{hash_password, password_matches, PasswordError};
pub use token::{generate_token, hash_plaintext, Scope, Token, TokenError, TOKEN_PLAINTEXT_LEN};
