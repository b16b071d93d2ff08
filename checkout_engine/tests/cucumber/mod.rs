mod steps;
mod world;

pub use world::{CheckoutSystem, CheckoutWorld};
