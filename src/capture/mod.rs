//! Device adapters: camera stills and position fixes.
//!
//! Both hand out handles that release the underlying device when dropped, so
//! tearing down a screen always stops an open camera stream or location
//! watch.

pub mod camera;
pub mod location;
