pub mod driver;
pub mod engine;
pub mod rows;
pub mod scripts;
pub mod session;
pub mod wait;
