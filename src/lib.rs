pub mod app;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod fs_util;
pub mod index;
pub mod model;
pub mod output;
pub mod remote;
pub mod resolver;
pub mod search;
pub mod store;
