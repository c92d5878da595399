pub mod banner;
pub mod config;
pub mod consts;
pub mod detect;
pub mod generator;
pub mod prompts;
pub mod relay;
pub mod server;
