pub mod error;
pub mod event;
pub mod event_bus;
pub mod handler;
pub mod model;
pub mod port;
pub mod serialization;
pub mod service;
