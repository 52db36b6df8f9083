pub mod handlers;
pub mod membership;
pub mod profile;
