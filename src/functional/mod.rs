mod buf;
pub use buf::*;

pub mod coding;
pub use coding::*;
