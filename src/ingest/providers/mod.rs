pub mod fixture;
pub mod xai;
