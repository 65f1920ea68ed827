// Module exports for models

pub mod booking;
pub mod settings;
