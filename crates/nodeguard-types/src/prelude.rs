pub use crate::error::{Error, NgResult};
pub use crate::types::{Uid, UserKey, UserQuota};

pub use tracing::{debug, error, info, trace, warn};

// vim: ts=4
