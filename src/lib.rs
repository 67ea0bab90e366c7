pub mod catalog;
pub mod cli;
pub mod domain;
pub mod repository;
pub mod seed;
pub mod services;
pub mod utils;
pub mod web;
