pub mod channel;
pub mod conversations;
pub mod error;
pub mod media;
pub mod messages;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod store;
