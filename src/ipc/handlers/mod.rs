pub mod catalog;
pub mod certificate;
pub mod core;
pub mod marks;
pub mod sheet;
pub mod students;
