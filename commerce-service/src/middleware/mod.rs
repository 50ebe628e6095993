pub mod session;

pub use session::{authorize, Capability, Role, Session};
