mod allocation;
mod eval;
mod filter;
mod flag;
mod ratio;
mod rollout;
mod setting;
mod store;
mod targeting;
mod test_common;
mod time_window;
mod util;
mod variant;

pub use allocation::*;
pub use eval::*;
pub use filter::*;
pub use flag::*;
pub use ratio::*;
pub use rollout::*;
pub use setting::*;
pub use store::*;
pub use targeting::*;
pub use time_window::*;
pub use variant::*;
