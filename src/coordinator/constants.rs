use std::time::Duration;

pub(crate) const GREETING_NOTICE_DELAY: Duration = Duration::from_millis(1_000);
pub(crate) const INITIAL_LISTEN_DELAY: Duration = Duration::from_millis(3_000);
pub(crate) const RESUME_LISTEN_GRACE: Duration = Duration::from_millis(800);
pub(crate) const SYNTH_ERROR_RESUME_DELAY: Duration = Duration::from_millis(1_000);
pub(crate) const CAPTURE_IDLE_RESTART_DELAY: Duration = Duration::from_millis(1_500);
pub(crate) const CAPTURE_RESTART_BACKOFF: Duration = Duration::from_millis(2_000);
