pub mod deserialize;
pub mod launch;
pub mod logger;
