pub mod lock;
pub mod sink;
pub mod source;

pub use sink::Sink;
pub use source::Source;
