// Admin module - operator endpoints served by the engine itself

pub mod purge;
