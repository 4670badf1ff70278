pub mod channel;
pub mod existence;
pub mod layouts;
pub mod serialize;
pub mod session;
pub mod types;
pub mod upload;
pub mod uploader;
