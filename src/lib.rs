// src/lib.rs

//! twecrawl: quota-aware keyword crawler library

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod state;
pub mod storage;
pub mod utils;
