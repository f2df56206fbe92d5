//! HTTP middleware

pub mod received_at;
pub mod request_id;

pub use received_at::{ReceivedAt, received_at_middleware};
pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
