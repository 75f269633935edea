pub mod event;
pub mod location;
pub mod order;
pub mod user;
