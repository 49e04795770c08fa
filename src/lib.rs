pub mod error;
pub mod logger;
pub mod port;
pub mod resolver;
pub mod scan;
