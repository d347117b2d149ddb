pub mod analytics;
pub mod core;
pub mod courses;
pub mod facts;
pub mod groups;
pub mod lessons;
pub mod reports;
pub mod settings;
pub mod students;
