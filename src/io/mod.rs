pub mod chunked;
pub mod glb;
pub mod layout;
pub mod source;
pub mod spb;

#[cfg(feature = "io_ply")]
pub mod ply;
