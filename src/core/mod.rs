//! Core building blocks: georeferencing, dataset parameters, and the chipping,
//! alignment and labelling steps consumed by the high-level `api` module.
pub mod georef;
pub mod params;
pub mod processing;
