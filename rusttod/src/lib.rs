// src/lib.rs
pub mod data {
    pub mod container;
    pub mod savefile;
    pub mod header;
    pub mod handle;
}

pub mod error;
