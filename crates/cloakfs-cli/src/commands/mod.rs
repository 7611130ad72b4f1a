pub mod keygen;
pub mod mount;
