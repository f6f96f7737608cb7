pub mod config;
pub mod dashboard;
pub mod feed;
pub mod view;
