pub mod auth;
pub mod clinic;
pub mod dispatch;
pub mod shared;
