//! Application services shared by several handlers.

mod user_service;

pub use user_service::{
    CreditChangeOptions, UserService, UserServiceError, WELCOME_BONUS_DESCRIPTION,
};
