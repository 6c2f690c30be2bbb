pub mod booking;
pub mod calendar;
pub mod config;
pub mod engine;
pub mod groups;
pub mod limits;
pub mod model;
pub mod observability;
