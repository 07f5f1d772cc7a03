pub mod core;
pub mod courses;
pub mod enrollments;
pub mod import;
pub mod reports;
pub mod search;
pub mod setup;
pub mod students;
