pub mod queue;
pub mod recipient;
pub mod request;
