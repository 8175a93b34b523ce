pub mod assignment;
pub mod load;
pub mod message;
pub mod notification;
pub mod position;
