pub mod events;
pub mod models;
pub mod normalize;
pub mod providers;
pub mod request;
