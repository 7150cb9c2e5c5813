pub mod clarabel_lp;
pub mod enumerate_mip;
