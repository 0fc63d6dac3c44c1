use std::time::{Duration, Instant};

// Upper bound for a state machine to settle.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

// Polls a condition until it holds or the timeout expires.
pub(crate) fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + SETTLE_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
