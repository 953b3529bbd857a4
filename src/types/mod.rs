pub mod bucket;
pub mod factor;
pub mod lifecycle;
pub mod location;
pub mod scope;
