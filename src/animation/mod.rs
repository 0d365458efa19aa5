pub mod clip;
pub mod mixer;
pub mod skin;
