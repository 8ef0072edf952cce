//! Request and response hooks around the HTTP transport

pub mod request;
pub mod response;

pub use request::{Admission, RequestGate};
pub use response::ResponseGate;
