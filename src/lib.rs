pub mod catalog;
pub mod config;
pub mod conversion;
pub mod deals;
pub mod leads;
pub mod projects;
pub mod shared;
