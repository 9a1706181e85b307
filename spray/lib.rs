#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod analysis;
pub mod cmap;
pub mod config;
pub mod data;
pub mod persist;
pub mod pipeline;
pub mod render;
pub mod stages;
