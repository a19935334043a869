pub mod api;
pub mod complaints;
pub mod directory;
pub mod lifecycle;
pub mod session;
