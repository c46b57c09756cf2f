pub mod overlay;
pub mod session;
pub mod view;
