pub mod parse;
pub mod serve;
pub mod simulate;

pub use parse::handle_parse;
pub use serve::handle_serve;
pub use simulate::handle_simulate;
