use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Try to get info from a panic payload
pub(crate) fn best_effort_panic_info<'a>(payload: &'a (dyn Any + Send + 'static)) -> &'a str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        crate::debug!(
            "encountered unknown panic info with type id: {:?}",
            payload.type_id()
        );
        "unknown panic info"
    }
}

pub(crate) fn next_atomic_usize() -> usize {
    static ID: AtomicUsize = AtomicUsize::new(1);
    ID.fetch_add(1, Ordering::SeqCst)
}
