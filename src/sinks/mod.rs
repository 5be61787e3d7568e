pub mod auth_header;
pub mod sink_http;
