pub use nodeguard_types::error::{Error, NgResult};
pub use nodeguard_types::types::{Uid, UserInfo, UserKey, UserQuota};

pub use tracing::{debug, error, info, trace, warn};

// vim: ts=4
