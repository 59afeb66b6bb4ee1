use crate::domain::Timestamp;
use crate::ports::TimeSource;

/// Wall-clock time source.
///
/// For tests, use `FixedTimeSource` from the test utilities.
///
/// # Example
///
/// ```rust
/// use kad_routing::adapters::time::SystemTimeSource;
/// use kad_routing::ports::TimeSource;
///
/// let time_source = SystemTimeSource::new();
/// assert!(time_source.now().as_millis() > 0);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl SystemTimeSource {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        use std::time::{SystemTime, UNIX_EPOCH};

        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        Timestamp::from_millis(duration.as_millis() as u64)
    }
}
