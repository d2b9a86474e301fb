pub mod rest;

pub use rest::{routes, RestApi};
