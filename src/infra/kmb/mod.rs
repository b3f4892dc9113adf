mod client;

pub use client::KmbClient;
