pub mod bridge;
pub mod catalog;
pub mod config;
pub mod cursor;
pub mod display;
pub mod engine;
pub mod error;
pub mod events;
pub mod processing {
    pub mod decode;
    pub mod fit;
}
pub mod sink;
pub mod store;
pub mod tasks {
    pub mod control;
    pub mod scheduler;
}
