pub mod auth;
pub mod catalog;
pub mod chat;
pub mod events;
pub mod images;
