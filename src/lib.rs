pub mod document;
pub mod dump;
pub mod filter;
pub mod settings;
pub mod storage;
pub mod utils;
