//! Builders that assemble schedulers from settings.

pub mod scheduler_builder;

pub use scheduler_builder::TaskSchedulerBuilder;
