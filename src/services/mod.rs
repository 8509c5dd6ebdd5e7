pub mod email;
pub mod encryption;
