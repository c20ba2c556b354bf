pub mod tracker_factory;
