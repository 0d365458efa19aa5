pub mod generate_tangents;
pub mod loader;
