//! Ambient runtime support: error taxonomy, logging, and the panic handler.

pub mod error;
pub mod heap;
pub mod panic;
pub mod printk;
