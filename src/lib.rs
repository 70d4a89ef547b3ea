pub mod app;
pub mod classify;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod grid;
pub mod job;
pub mod materialize;
pub mod naming;
pub mod output;
pub mod progress;
pub mod rewrite;
pub mod tree;
