pub mod app;
mod commands;
mod config;
mod context;
mod dispatch;
mod endpoints;
mod env;
mod output;
mod runtime;
mod serve;
