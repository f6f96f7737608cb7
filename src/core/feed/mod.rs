pub mod fetcher;
pub mod parser;
pub mod samples;
pub mod types;
