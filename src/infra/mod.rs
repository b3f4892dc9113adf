pub mod kmb;
