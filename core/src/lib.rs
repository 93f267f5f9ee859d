pub mod classify;
pub mod db;
pub mod error;
pub mod export;
pub mod grid;
pub mod grocery;
pub mod ics;
pub mod instructions;
pub mod models;
pub mod quantity;
pub mod range;
pub mod service;
pub mod source;

pub use error::{PlanError, PlanResult};
