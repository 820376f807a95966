pub mod activity;
pub mod core;
pub mod enrollments;
pub mod payments;
pub mod students;
pub mod tables;
pub mod transactions;
pub mod tuitions;
