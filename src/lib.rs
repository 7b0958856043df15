//! Class Engagement Index: scoring of daily classroom reflections and
//! weekly trend aggregation per teacher, class and subject.

pub mod cei;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod import;
pub mod models;
pub mod report;
pub mod store;
pub mod submit;
pub mod trend;
pub mod validate;

pub use config::EngineConfig;
pub use error::CoreError;
pub use models::{CeiRecord, DailyReflectionInput, Scope, WeeklyAggregate};
pub use store::{MemoryStore, ReflectionStore};
