#![allow(dead_code)]

pub mod doubles;
pub mod pipeline;
pub mod server;
