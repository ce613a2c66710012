pub mod bag;
pub mod config;
pub mod doctor;
pub mod process;
pub mod recipe;
