pub mod notification;
pub mod settings;
pub mod templates;
