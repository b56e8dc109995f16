pub mod accounts;
pub mod auth;
pub mod gmail;
pub mod utils;
