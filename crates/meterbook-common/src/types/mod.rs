//! Core types shared by the store and the engine

pub mod invoice;
pub mod period;
pub mod sample;
pub mod source_key;
pub mod validity;
