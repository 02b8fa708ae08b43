//! Error numbers used by the legacy integer projections.

/// Bad address.
pub const EFAULT: i32 = 14;

/// Invalid argument.
pub const EINVAL: i32 = 22;
