// Futsal Booking Monitor Library
// Exports all modules for testing and reuse

pub mod models;
pub mod services;
