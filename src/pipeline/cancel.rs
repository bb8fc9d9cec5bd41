use std::sync::{
    atomic::{
        AtomicBool,
        Ordering,
    },
    Arc,
};

/// Requests a soft stop: the pipeline stops issuing new batches, lets
/// in-flight rows finish, and still runs its cleanup.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
