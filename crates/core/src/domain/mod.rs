pub mod action;
pub mod comment;
pub mod request;
