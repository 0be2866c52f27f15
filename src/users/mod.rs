pub mod dto;
pub mod form;
pub mod handlers;
pub mod model;
pub mod services;

pub use handlers::router;
