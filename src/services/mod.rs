pub mod delivery_service;
pub mod friendship_service;
pub mod identity_change_service;
pub mod notification_service;
pub mod sweep_service;
