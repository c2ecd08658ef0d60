pub mod proposals;
pub mod status;
