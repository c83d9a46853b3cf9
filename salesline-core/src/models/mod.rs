mod auto_loss;
mod event;
mod note;
mod pipeline;
mod signal;
mod stage;

pub use auto_loss::*;
pub use event::*;
pub use note::*;
pub use pipeline::*;
pub use signal::*;
pub use stage::*;
