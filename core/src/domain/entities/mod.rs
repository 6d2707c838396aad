//! Domain entities

pub mod token;

pub use token::{
    Claims, IssuedToken, RawClaims, TokenPair, TokenType, ValidationRules, MAX_USERNAME_LENGTH,
};
