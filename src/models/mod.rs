pub mod complaint;
pub mod directory;
pub mod session;
