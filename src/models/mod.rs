pub mod embed;
pub mod message;
