// Service module exports

pub mod api;
pub mod eligibility;
pub mod monitor;
pub mod notification;
pub mod settings;
pub mod telemetry;
