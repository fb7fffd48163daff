pub mod admin;
pub mod friendships;
pub mod identity;
pub mod notifications;
