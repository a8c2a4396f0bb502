pub use crate::error::{Error, NgResult};
pub use crate::types::{Uid, UserInfo, UserKey};
pub use tracing::{debug, error, info, trace, warn};

// vim: ts=4
