pub mod feed_api;
