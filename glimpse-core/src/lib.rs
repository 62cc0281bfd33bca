#![allow(clippy::new_without_default)]

pub mod actor;
pub mod config;
pub mod error;
pub mod fetch;
pub mod model;
pub mod playback;
pub mod resolver;
pub mod session;
pub mod store;
pub mod upload;
pub mod util;
pub mod webapi;
