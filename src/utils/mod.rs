pub mod auth;
pub mod id_string;
pub mod ids;
pub mod media;
