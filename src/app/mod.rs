pub mod render;
pub mod server;

pub use server::{router, serve};
