// Worker constants (no magic values)
use std::time::Duration;

/// Client-side timeout for one forward (5 minutes)
pub const DEFAULT_FORWARD_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Longest message body echoed into log lines (bytes)
pub const LOG_BODY_PREVIEW_LIMIT: usize = 512;

/// Forwards one consumer loop keeps open at once; deliveries wait in the
/// broker stream until a slot frees up
pub const MAX_IN_FLIGHT_FORWARDS: usize = 1;
